//! Pipeline orchestration: the state machine that sequences the stages.
//!
//! Each transition is a small step so the run reads top to bottom:
//! workspace, optional orthophoto branch, query image, satellite imagery,
//! matching. Any error ends the run in the state reached so far.
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{BoundingBox, Mode, RunConfiguration, COORDINATE_FIELDS};
use crate::error::{
    CoordinateError, MissingArtifactError, PipelineError, PipelineFailure, PreconditionError,
    UnmetPreconditions,
};
use crate::executor::{CommandRunner, ExecutedStage, StageExecutor};
use crate::invocation::Stage;
use crate::prompt::Operator;
use crate::settings::{Settings, SATELLITE_API_KEY_VAR};
use crate::transfer;
use crate::workspace::{absolutize, OdmProject, VglWorkspace};

pub mod stages;

/// Progress markers of one run, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Init,
    WorkspaceReady,
    OrthophotoGenerated,
    OrthophotoConverted,
    SatelliteResolved,
    MatchingComplete,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "init",
            PipelineState::WorkspaceReady => "workspace-ready",
            PipelineState::OrthophotoGenerated => "orthophoto-generated",
            PipelineState::OrthophotoConverted => "orthophoto-converted",
            PipelineState::SatelliteResolved => "satellite-resolved",
            PipelineState::MatchingComplete => "matching-complete",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// The operator stopped after reviewing the orthophoto.
    StoppedAtReview { orthophoto: PathBuf },
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub states: Vec<PipelineState>,
    pub stages: Vec<ExecutedStage>,
    pub workspace: PathBuf,
    pub query_image: Option<PathBuf>,
    pub map_tiles_copied: usize,
}

pub struct Pipeline<'a> {
    config: &'a RunConfiguration,
    settings: &'a Settings,
    executor: StageExecutor<'a>,
    operator: &'a mut dyn Operator,
    workspace: VglWorkspace,
    states: Vec<PipelineState>,
    query_image: Option<PathBuf>,
    map_tiles_copied: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RunConfiguration,
        settings: &'a Settings,
        runner: &'a mut dyn CommandRunner,
        operator: &'a mut dyn Operator,
    ) -> Result<Self, PipelineError> {
        let root = absolutize(config.vgl_dir()).map_err(|source| PipelineError::Workspace {
            action: "resolve workspace path",
            path: config.vgl_dir().to_path_buf(),
            source,
        })?;
        Ok(Self {
            config,
            settings,
            executor: StageExecutor::new(runner, config.dry_run),
            operator,
            workspace: VglWorkspace::new(root),
            states: vec![PipelineState::Init],
            query_image: None,
            map_tiles_copied: 0,
        })
    }

    /// Last state reached.
    pub fn state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Init)
    }

    /// Drive the run to completion or to the first error.
    pub fn run(mut self) -> Result<RunReport, PipelineFailure> {
        tracing::info!(
            mode = self.config.mode.name(),
            workspace = %self.workspace.root().display(),
            dry_run = self.config.dry_run,
            "starting pipeline"
        );
        match self.drive() {
            Ok(outcome) => Ok(RunReport {
                outcome,
                stages: self.executor.into_transcript(),
                states: self.states,
                workspace: self.workspace.root().to_path_buf(),
                query_image: self.query_image,
                map_tiles_copied: self.map_tiles_copied,
            }),
            Err(error) => Err(PipelineFailure {
                last_state: self.state(),
                error,
            }),
        }
    }

    fn drive(&mut self) -> Result<Outcome, PipelineError> {
        self.prepare_workspace()?;

        let config = self.config;
        let query_source = match &config.mode {
            Mode::HighAltitude { image } => image.clone(),
            Mode::LowAltitude {
                gsd_cm_per_px,
                odm_project,
            } => {
                let project = OdmProject::new(absolutize(odm_project).map_err(|source| {
                    PipelineError::Workspace {
                        action: "resolve ODM project path",
                        path: odm_project.clone(),
                        source,
                    }
                })?);
                self.generate_orthophoto(&project, *gsd_cm_per_px)?;
                let converted = self.convert_orthophoto(&project)?;
                if self.review_declined(&converted)? {
                    tracing::info!(
                        orthophoto = %converted.display(),
                        "stopping after orthophoto review at operator request"
                    );
                    return Ok(Outcome::StoppedAtReview {
                        orthophoto: converted,
                    });
                }
                converted
            }
        };

        self.stage_query_image(&query_source)?;
        self.resolve_satellite()?;
        self.run_matching()?;
        self.advance(PipelineState::Done);
        Ok(Outcome::Completed)
    }

    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state(), to = %next, "pipeline transition");
        self.states.push(next);
    }

    fn prepare_workspace(&mut self) -> Result<(), PipelineError> {
        if self.config.dry_run {
            for dir in self.workspace.missing_dirs() {
                tracing::info!(path = %dir.display(), "dry-run: would create directory");
            }
        } else {
            self.workspace
                .ensure()
                .map_err(|source| PipelineError::Workspace {
                    action: "create workspace",
                    path: self.workspace.root().to_path_buf(),
                    source,
                })?;
            tracing::info!(path = %self.workspace.root().display(), "workspace ready");
        }
        self.advance(PipelineState::WorkspaceReady);
        Ok(())
    }

    fn generate_orthophoto(
        &mut self,
        project: &OdmProject,
        gsd_cm_per_px: f64,
    ) -> Result<(), PipelineError> {
        let invocation =
            stages::orthophoto(self.settings, project, gsd_cm_per_px, self.config.use_gpu)?;
        self.executor.execute(&invocation)?;
        self.require_artifact(Stage::Orthophoto, &project.orthophoto_path())?;
        self.advance(PipelineState::OrthophotoGenerated);
        Ok(())
    }

    fn convert_orthophoto(&mut self, project: &OdmProject) -> Result<PathBuf, PipelineError> {
        let converted_locally = match self.settings.locate(&self.settings.local_converter) {
            Some(program) => {
                let invocation =
                    stages::local_conversion(&program.to_string_lossy(), project)?;
                match self.executor.execute(&invocation) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(error = %err, "local conversion failed; falling back to container");
                        false
                    }
                }
            }
            None => {
                tracing::info!(
                    converter = %self.settings.local_converter,
                    "local converter unavailable; converting in container"
                );
                false
            }
        };
        if !converted_locally {
            let invocation = stages::container_conversion(self.settings, project)?;
            self.executor.execute(&invocation)?;
        }

        let converted = project.converted_path();
        self.require_artifact(Stage::OrthophotoConversion, &converted)?;
        self.advance(PipelineState::OrthophotoConverted);
        Ok(converted)
    }

    /// A stage that exited zero must have left its artifact behind.
    fn require_artifact(&self, stage: Stage, path: &Path) -> Result<(), MissingArtifactError> {
        if self.config.dry_run {
            tracing::debug!(stage = stage.label(), path = %path.display(), "dry-run: artifact not checked");
            return Ok(());
        }
        if path.is_file() {
            return Ok(());
        }
        Err(MissingArtifactError {
            stage: stage.label(),
            path: path.to_path_buf(),
        })
    }

    fn review_declined(&mut self, orthophoto: &Path) -> Result<bool, PipelineError> {
        if !self.config.interactive || self.config.skip_orthophoto_review {
            return Ok(false);
        }
        if self.config.dry_run {
            tracing::info!("dry-run: skipping orthophoto review");
            return Ok(false);
        }
        let question = format!(
            "Orthophoto written to {}. Continue to matching?",
            orthophoto.display()
        );
        let proceed = self.operator.confirm(&question, true)?;
        Ok(!proceed)
    }

    fn stage_query_image(&mut self, source: &Path) -> Result<(), PipelineError> {
        let query_dir = self.workspace.query_dir();
        if self.config.dry_run {
            tracing::info!(
                source = %source.display(),
                dest = %query_dir.display(),
                "dry-run: would copy query image"
            );
            self.query_image = source.file_name().map(|name| query_dir.join(name));
            return Ok(());
        }
        let dest = transfer::copy_into_dir(source, &query_dir).map_err(|err| {
            PipelineError::Workspace {
                action: "copy query image into",
                path: query_dir.clone(),
                source: err,
            }
        })?;
        tracing::info!(path = %dest.display(), "query image staged");
        self.query_image = Some(dest);
        Ok(())
    }

    fn resolve_satellite(&mut self) -> Result<(), PipelineError> {
        if !self.config.download_satellite {
            tracing::info!("satellite download not requested; matching against existing map/");
            self.advance(PipelineState::SatelliteResolved);
            return Ok(());
        }

        let requested = self
            .config
            .bounding_box
            .ok_or_else(|| CoordinateError::Incomplete {
                missing: COORDINATE_FIELDS.to_vec(),
            })?;
        let (tl_lat, tl_lon) = requested.top_left();
        let (br_lat, br_lon) = requested.bottom_right();
        let bbox = BoundingBox::new(tl_lat, tl_lon, br_lat, br_lon)?;
        if !self.settings.satellite_key_present {
            return Err(UnmetPreconditions::from(PreconditionError::MissingSecret {
                variable: SATELLITE_API_KEY_VAR.to_string(),
            })
            .into());
        }

        let invocation = stages::satellite_download(
            self.settings,
            &self.workspace,
            &bbox,
            self.config.stitch_size,
        )?;
        self.executor.execute(&invocation)?;
        self.collect_stitched_tiles()?;
        self.advance(PipelineState::SatelliteResolved);
        Ok(())
    }

    fn collect_stitched_tiles(&mut self) -> Result<(), PipelineError> {
        let stitched = self.workspace.stitched_dir();
        let map_dir = self.workspace.map_dir();
        if self.config.dry_run {
            tracing::info!(
                source = %stitched.display(),
                dest = %map_dir.display(),
                "dry-run: would copy stitched tiles"
            );
            return Ok(());
        }
        if !stitched.is_dir() {
            // Not fatal: map/ may already hold reference imagery.
            tracing::warn!(
                path = %stitched.display(),
                "satellite download produced no stitched directory; nothing copied into map/"
            );
            return Ok(());
        }
        let copied = transfer::copy_tree_files(&stitched, &map_dir).map_err(|source| {
            PipelineError::Workspace {
                action: "copy stitched tiles into",
                path: map_dir.clone(),
                source,
            }
        })?;
        tracing::info!(count = copied.len(), "stitched tiles copied into map/");
        self.map_tiles_copied = copied.len();
        Ok(())
    }

    fn run_matching(&mut self) -> Result<(), PipelineError> {
        let invocation = stages::matching(self.settings, &self.workspace)?;
        self.executor.execute(&invocation)?;
        self.advance(PipelineState::MatchingComplete);
        Ok(())
    }
}
