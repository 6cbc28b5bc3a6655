//! CLI argument parsing for the geolocalization pipeline.
//!
//! The CLI is intentionally thin: it captures raw flag values and positional
//! tokens, and `config::resolve` decides what they mean.
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::ConfigurationError;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "vgl-pipeline",
    version,
    about = "Drive ODM and VGL to geolocalize aerial imagery",
    after_help = "Modes:\n  High altitude: vgl-pipeline [OPTIONS] <IMAGE>\n  Low altitude:  vgl-pipeline [OPTIONS] <GSD_CM_PER_PX> <ODM_PROJECT_DIR>\n\nLow-altitude mode requires a GSD below 20 cm/px and a project directory\nwith an images/ folder (jpg, jpeg, png or mp4).\n\nEnvironment:\n  VGL_SATELLITE_API_KEY  Satellite provider key (required with --download-satellite)\n  VGL_REGISTRY, VGL_TAG  Registry and tag of the VGL image\n  VGL_CONTAINER_RUNTIME  Container runtime binary (default: docker)\n\nExamples:\n  vgl-pipeline drone.jpg\n  vgl-pipeline --non-interactive --use-gpu 15.5 /data/proj\n  vgl-pipeline --download-satellite --top-left-lat 47.4 --top-left-lon 8.5 \\\n      --bottom-right-lat 47.3 --bottom-right-lon 8.6 drone.jpg"
)]
pub struct RootArgs {
    /// Image file (high altitude) or GSD in cm/px followed by an ODM project directory (low altitude)
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// Emit debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only emit warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Never prompt; unresolved choices take their defaults
    #[arg(long)]
    pub non_interactive: bool,

    /// Log every command and filesystem action without performing it
    #[arg(long)]
    pub dry_run: bool,

    /// VGL workspace root (query/, map/, output/)
    #[arg(long, value_name = "DIR", env = "VGL_DIR")]
    pub vgl_dir: Option<PathBuf>,

    /// Run ODM on the GPU image
    #[arg(long, overrides_with = "no_gpu")]
    pub use_gpu: bool,

    /// Run ODM on the CPU image
    #[arg(long, overrides_with = "use_gpu")]
    pub no_gpu: bool,

    /// Download satellite reference imagery for the bounding box
    #[arg(long, overrides_with = "skip_satellite")]
    pub download_satellite: bool,

    /// Use reference imagery already present in map/
    #[arg(long, overrides_with = "download_satellite")]
    pub skip_satellite: bool,

    /// Continue to matching without reviewing the orthophoto
    #[arg(long)]
    pub skip_orthophoto_review: bool,

    /// Satellite tile stitch size
    #[arg(long, value_name = "N")]
    pub stitch_size: Option<String>,

    /// Bounding box top-left latitude in decimal degrees
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    pub top_left_lat: Option<String>,

    /// Bounding box top-left longitude in decimal degrees
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    pub top_left_lon: Option<String>,

    /// Bounding box bottom-right latitude in decimal degrees
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    pub bottom_right_lat: Option<String>,

    /// Bounding box bottom-right longitude in decimal degrees
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    pub bottom_right_lon: Option<String>,
}

/// What the command line asked for before any resolution.
#[derive(Debug)]
pub enum Invocation {
    Run(RootArgs),
    /// Help or version text to print before exiting successfully.
    Info(String),
}

/// Parse raw arguments, mapping clap failures onto the configuration taxonomy.
pub fn parse<I, T>(args: I) -> Result<Invocation, ConfigurationError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match RootArgs::try_parse_from(args) {
        Ok(parsed) => Ok(Invocation::Run(parsed)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                Ok(Invocation::Info(err.render().to_string()))
            }
            ErrorKind::UnknownArgument => {
                let arg = match err.get(ContextKind::InvalidArg) {
                    Some(ContextValue::String(arg)) => arg.clone(),
                    _ => "<unknown>".to_string(),
                };
                Err(ConfigurationError::UnknownOption(arg))
            }
            _ => Err(ConfigurationError::Usage(
                err.render().to_string().trim_end().to_string(),
            )),
        },
    }
}
