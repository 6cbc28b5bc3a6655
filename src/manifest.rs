//! Run manifest written to `output/run_manifest.json` after a live run.
//!
//! The manifest records what ran and with which inputs so a workspace can be
//! audited later. Secrets never appear: only the name of the key variable.
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{BoundingBox, Mode, RunConfiguration};
use crate::executor::ExecutedStage;
use crate::pipeline::{Outcome, PipelineState, RunReport};
use crate::settings::{Settings, SATELLITE_API_KEY_VAR};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct RunManifest {
    schema_version: u32,
    generated_at_epoch_ms: u128,
    tool_version: String,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gsd_cm_per_px: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    odm_project: Option<PathBuf>,
    workspace: PathBuf,
    use_gpu: bool,
    download_satellite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounding_box: Option<BoundingBox>,
    stitch_size: u32,
    images: ImagesMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    satellite_key_variable: Option<&'static str>,
    outcome: Outcome,
    states: Vec<PipelineState>,
    stages: Vec<ExecutedStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_image: Option<PathBuf>,
    map_tiles_copied: usize,
}

#[derive(Debug, Serialize)]
struct ImagesMeta {
    runtime: String,
    vgl: String,
    odm: String,
    gdal: String,
}

impl RunManifest {
    pub fn new(config: &RunConfiguration, settings: &Settings, report: &RunReport) -> Self {
        let generated_at_epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis())
            .unwrap_or(0);
        let (image, gsd_cm_per_px, odm_project) = match &config.mode {
            Mode::HighAltitude { image } => (Some(image.clone()), None, None),
            Mode::LowAltitude {
                gsd_cm_per_px,
                odm_project,
            } => (None, Some(*gsd_cm_per_px), Some(odm_project.clone())),
        };
        let odm = if config.use_gpu {
            &settings.odm_gpu_image
        } else {
            &settings.odm_image
        };
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at_epoch_ms,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: config.mode.name(),
            image,
            gsd_cm_per_px,
            odm_project,
            workspace: report.workspace.clone(),
            use_gpu: config.use_gpu,
            download_satellite: config.download_satellite,
            bounding_box: config.bounding_box,
            stitch_size: config.stitch_size,
            images: ImagesMeta {
                runtime: settings.runtime.clone(),
                vgl: settings.vgl_image.clone(),
                odm: odm.clone(),
                gdal: settings.gdal_image.clone(),
            },
            satellite_key_variable: config.download_satellite.then_some(SATELLITE_API_KEY_VAR),
            outcome: report.outcome.clone(),
            states: report.states.clone(),
            stages: report.stages.clone(),
            query_image: report.query_image.clone(),
            map_tiles_copied: report.map_tiles_copied,
        }
    }

    /// Serialize to `path` through a temporary sibling.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).context("serialize run manifest")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| format!("publish {}", path.display()))?;
        Ok(())
    }
}
