//! Argument resolution: flags and positional tokens into a pending configuration.
use std::fs::File;
use std::path::{Path, PathBuf};

use super::{
    parse_count, parse_decimal, BoundingBox, Choice, Mode, PendingConfiguration,
    MAX_LOW_ALTITUDE_GSD,
};
use crate::cli::RootArgs;
use crate::error::ConfigurationError;

/// Resolve parsed arguments into a [`PendingConfiguration`].
///
/// The first positional token is an image file if one exists at that path,
/// otherwise an unsigned GSD followed by the ODM project directory. File
/// existence is checked first, so a file literally named `15` is an image.
pub fn resolve(args: RootArgs) -> Result<PendingConfiguration, ConfigurationError> {
    let mode = resolve_mode(&args.inputs)?;

    let bounding_box = BoundingBox::from_parts([
        args.top_left_lat.as_deref(),
        args.top_left_lon.as_deref(),
        args.bottom_right_lat.as_deref(),
        args.bottom_right_lon.as_deref(),
    ])?;

    let stitch_size = args
        .stitch_size
        .as_deref()
        .map(|raw| parse_count("stitch size", raw))
        .transpose()?;

    Ok(PendingConfiguration {
        mode,
        vgl_dir: args.vgl_dir,
        use_gpu: Choice::from_flags(args.use_gpu, args.no_gpu),
        download_satellite: Choice::from_flags(args.download_satellite, args.skip_satellite),
        bounding_box,
        stitch_size,
        skip_orthophoto_review: args.skip_orthophoto_review,
        interactive: !args.non_interactive,
        dry_run: args.dry_run,
        verbose: args.verbose,
    })
}

fn resolve_mode(inputs: &[String]) -> Result<Mode, ConfigurationError> {
    let mut tokens = inputs.iter();
    let first = tokens
        .next()
        .ok_or(ConfigurationError::MissingArgument("<IMAGE> or <GSD> <ODM_PROJECT_DIR>"))?;

    let mode = if is_readable_file(Path::new(first)) {
        Mode::HighAltitude {
            image: PathBuf::from(first),
        }
    } else if let Some(gsd) = parse_decimal(first, false) {
        if gsd >= MAX_LOW_ALTITUDE_GSD {
            return Err(ConfigurationError::GsdOutOfRange(gsd));
        }
        let project = tokens
            .next()
            .ok_or(ConfigurationError::MissingArgument("<ODM_PROJECT_DIR> after the GSD"))?;
        Mode::LowAltitude {
            gsd_cm_per_px: gsd,
            odm_project: PathBuf::from(project),
        }
    } else {
        return Err(ConfigurationError::InvalidArgument(first.clone()));
    };

    if let Some(extra) = tokens.next() {
        return Err(ConfigurationError::TooManyArguments(extra.clone()));
    }
    Ok(mode)
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
