//! Environment checks that must pass before any stage runs.
use std::fs;
use std::path::Path;

use crate::config::{Mode, RunConfiguration};
use crate::error::{PreconditionError, UnmetPreconditions};
use crate::executor::CommandRunner;
use crate::invocation::{Stage, StageInvocation};
use crate::settings::{Settings, SATELLITE_API_KEY_VAR};
use crate::workspace::{absolutize, OdmProject};

/// Raw capture extensions ODM accepts, matched exactly.
pub const ACCEPTED_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "mp4", "JPG", "JPEG", "PNG", "MP4"];

/// Result of one check: fatal gaps plus advisory warnings.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub unmet: Vec<PreconditionError>,
    pub warnings: Vec<String>,
}

impl PreflightReport {
    pub fn is_ready(&self) -> bool {
        self.unmet.is_empty()
    }

    /// Log the warnings and fail if anything is unmet.
    pub fn into_result(self) -> Result<(), UnmetPreconditions> {
        for warning in &self.warnings {
            tracing::warn!("{warning}");
        }
        if self.is_ready() {
            return Ok(());
        }
        Err(UnmetPreconditions(self.unmet))
    }
}

/// Check that the pipeline described by `config` can run here.
///
/// The runtime liveness probe executes a process, so dry-run skips it; every
/// other check applies in dry-run as well.
pub fn check(
    config: &RunConfiguration,
    settings: &Settings,
    runner: &mut dyn CommandRunner,
) -> PreflightReport {
    let mut report = PreflightReport::default();

    match settings.locate(&settings.runtime) {
        None => report.unmet.push(PreconditionError::MissingProgram {
            program: settings.runtime.clone(),
        }),
        Some(path) if config.dry_run => {
            tracing::info!(
                runtime = %path.display(),
                "dry-run: skipping container runtime liveness probe"
            );
        }
        Some(_) => {
            if let Err(unmet) = probe_runtime(settings, config.verbose, runner) {
                report.unmet.push(unmet);
            }
        }
    }

    if let Err(unmet) = check_mountable(config.vgl_dir()) {
        report.unmet.push(unmet);
    }

    if let Mode::LowAltitude { odm_project, .. } = &config.mode {
        if let Err(unmet) = check_mountable(odm_project) {
            report.unmet.push(unmet);
        }
        if let Err(unmet) = check_odm_project(&OdmProject::new(odm_project.clone())) {
            report.unmet.push(unmet);
        }
        if settings.locate(&settings.local_converter).is_none() {
            report.warnings.push(format!(
                "{} not found on PATH; orthophoto conversion will use the {} container",
                settings.local_converter, settings.gdal_image
            ));
        }
    }

    if config.download_satellite && !settings.satellite_key_present {
        report.unmet.push(PreconditionError::MissingSecret {
            variable: SATELLITE_API_KEY_VAR.to_string(),
        });
    }

    report
}

/// `<runtime> info`; its output is only shown with `--verbose`.
fn probe_runtime(
    settings: &Settings,
    verbose: bool,
    runner: &mut dyn CommandRunner,
) -> Result<(), PreconditionError> {
    let unhealthy = |detail: String| PreconditionError::RuntimeUnhealthy {
        runtime: settings.runtime.clone(),
        detail,
    };
    let mut probe = StageInvocation::host(Stage::RuntimeProbe, settings.runtime.clone()).arg("info");
    if !verbose {
        probe = probe.quiet();
    }
    let probe = probe
        .build()
        .map_err(|errors| unhealthy(errors.join("; ")))?;
    tracing::debug!(command = %probe.command_line(), "probing container runtime");
    match runner.run(&probe) {
        Ok(exit) if exit.success() => Ok(()),
        Ok(exit) => Err(unhealthy(match exit.code {
            Some(code) => format!("`{}` exited with status {code}", probe.command_line()),
            None => format!("`{}` was terminated by a signal", probe.command_line()),
        })),
        Err(err) => Err(unhealthy(err.to_string())),
    }
}

/// Mount specs are `host:container`, so the absolute host path cannot hold `:`.
fn check_mountable(path: &Path) -> Result<(), PreconditionError> {
    let unmountable = |reason: String| PreconditionError::UnmountablePath {
        path: path.to_path_buf(),
        reason,
    };
    let absolute = absolutize(path).map_err(|err| unmountable(err.to_string()))?;
    if absolute.to_string_lossy().contains(':') {
        return Err(unmountable("path contains ':'".to_string()));
    }
    Ok(())
}

/// The project must exist, have `images/`, and hold at least one accepted capture.
pub fn check_odm_project(project: &OdmProject) -> Result<(), PreconditionError> {
    if !project.root().is_dir() {
        return Err(PreconditionError::MissingDirectory {
            path: project.root().to_path_buf(),
        });
    }
    let images = project.images_dir();
    if !images.is_dir() {
        return Err(PreconditionError::MissingImagesDirectory {
            path: project.root().to_path_buf(),
        });
    }
    let no_images = || PreconditionError::NoInputImages {
        path: images.clone(),
        accepted: ACCEPTED_EXTENSIONS.join(", "),
    };
    let entries = fs::read_dir(&images).map_err(|_| no_images())?;
    let found = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .any(|path| path.is_file() && has_accepted_extension(&path));
    if found {
        Ok(())
    } else {
        Err(no_images())
    }
}

fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext))
}
