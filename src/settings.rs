//! Environment-driven settings for the external tools.
//!
//! Each value resolves as environment override > built-in default, so a
//! batch host can pin images and runtimes without touching the command line.
use anyhow::{anyhow, Result};
use regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable holding the satellite provider key.
pub const SATELLITE_API_KEY_VAR: &str = "VGL_SATELLITE_API_KEY";

const DEFAULT_RUNTIME: &str = "docker";
const DEFAULT_VGL_REGISTRY: &str = "ghcr.io/vgl-project";
const DEFAULT_VGL_TAG: &str = "latest";
const DEFAULT_ODM_IMAGE: &str = "opendronemap/odm";
const DEFAULT_ODM_GPU_IMAGE: &str = "opendronemap/odm:gpu";
const DEFAULT_GDAL_IMAGE: &str = "ghcr.io/osgeo/gdal:ubuntu-small-latest";
const DEFAULT_LOCAL_CONVERTER: &str = "gdal_translate";

/// Tool locations and container images for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Container runtime binary (`docker`, `podman`, or an absolute path).
    pub runtime: String,
    /// Image running satellite download and matching.
    pub vgl_image: String,
    pub odm_image: String,
    pub odm_gpu_image: String,
    /// Image used when the local raster converter is unavailable.
    pub gdal_image: String,
    pub local_converter: String,
    pub satellite_key_present: bool,
    /// Search path for program lookup; `None` means the process `PATH`.
    pub search_path: Option<OsString>,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let registry = var("VGL_REGISTRY").unwrap_or_else(|| DEFAULT_VGL_REGISTRY.to_string());
        let tag = var("VGL_TAG").unwrap_or_else(|| DEFAULT_VGL_TAG.to_string());
        let vgl_image = format!("{}/vgl:{tag}", registry.trim_end_matches('/'));

        let settings = Self {
            runtime: var("VGL_CONTAINER_RUNTIME").unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
            vgl_image,
            odm_image: var("ODM_IMAGE").unwrap_or_else(|| DEFAULT_ODM_IMAGE.to_string()),
            odm_gpu_image: var("ODM_GPU_IMAGE")
                .unwrap_or_else(|| DEFAULT_ODM_GPU_IMAGE.to_string()),
            gdal_image: var("GDAL_IMAGE").unwrap_or_else(|| DEFAULT_GDAL_IMAGE.to_string()),
            local_converter: DEFAULT_LOCAL_CONVERTER.to_string(),
            satellite_key_present: var(SATELLITE_API_KEY_VAR).is_some(),
            search_path: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (label, image) in [
            ("VGL image", &self.vgl_image),
            ("ODM image", &self.odm_image),
            ("ODM GPU image", &self.odm_gpu_image),
            ("GDAL image", &self.gdal_image),
        ] {
            if !image_reference().is_match(image) {
                return Err(anyhow!("{label} reference is invalid: {image}"));
            }
        }
        if self.runtime.chars().any(char::is_whitespace) {
            return Err(anyhow!(
                "container runtime must be a single program, got: {}",
                self.runtime
            ));
        }
        Ok(())
    }

    /// Locate `program` on the configured search path.
    pub fn locate(&self, program: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        match &self.search_path {
            Some(paths) => which::which_in(program, Some(paths), cwd).ok(),
            None => which::which_in(program, std::env::var_os("PATH"), cwd).ok(),
        }
    }
}

fn image_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._/:-]*(?:@sha256:[a-f0-9]{64})?$").expect("valid regex")
    })
}
