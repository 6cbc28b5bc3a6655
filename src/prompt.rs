//! Operator prompts that close the choices argument parsing left open.
//!
//! Non-interactive runs never touch the operator channel: every open field has
//! a fixed default. Interactive runs ask on stderr and read stdin, re-asking
//! until the answer is usable.
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::{
    parse_coordinate, parse_count, BoundingBox, PendingConfiguration, RunConfiguration,
    COORDINATE_FIELDS, DEFAULT_STITCH_SIZE, DEFAULT_VGL_DIR,
};
use crate::error::{ConfigurationError, CoordinateError};

/// Blocking question/answer channel with the operator.
pub trait Operator {
    /// Ask a yes/no question until the answer normalizes; empty takes `default`.
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool, ConfigurationError>;

    /// Ask a free-form question; empty takes `default` when there is one.
    ///
    /// Returns the trimmed answer, which may be empty when there is no default.
    fn answer(&mut self, question: &str, default: Option<&str>)
        -> Result<String, ConfigurationError>;

    /// Tell the operator why an answer was not accepted.
    fn notify(&mut self, message: &str) -> Result<(), ConfigurationError>;
}

/// Operator channel over a reader/writer pair (stdin/stderr in the binary).
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    fn ask_line(&mut self, prompt: &str, topic: &str) -> Result<String, ConfigurationError> {
        write!(self.output, "{prompt}").map_err(ConfigurationError::Operator)?;
        self.output.flush().map_err(ConfigurationError::Operator)?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(ConfigurationError::Operator)?;
        if read == 0 {
            return Err(ConfigurationError::InputClosed(topic.to_string()));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Operator for Console<R, W> {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool, ConfigurationError> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let line = self.ask_line(&format!("{question} {hint}: "), question)?;
            if line.is_empty() {
                return Ok(default);
            }
            match normalize_yes_no(&line) {
                Some(answer) => return Ok(answer),
                None => self.notify("Please answer y/yes or n/no.")?,
            }
        }
    }

    fn answer(
        &mut self,
        question: &str,
        default: Option<&str>,
    ) -> Result<String, ConfigurationError> {
        let prompt = match default {
            Some(default) => format!("{question} [{default}]: "),
            None => format!("{question}: "),
        };
        let line = self.ask_line(&prompt, question)?;
        match default {
            Some(default) if line.is_empty() => Ok(default.to_string()),
            _ => Ok(line),
        }
    }

    fn notify(&mut self, message: &str) -> Result<(), ConfigurationError> {
        writeln!(self.output, "{message}").map_err(ConfigurationError::Operator)
    }
}

/// Case-insensitive `y`/`yes`/`n`/`no`.
pub fn normalize_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Re-ask `question` until `parse` accepts the answer.
fn ask_until_valid<T>(
    operator: &mut dyn Operator,
    question: &str,
    default: Option<&str>,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigurationError> {
    loop {
        let raw = operator.answer(question, default)?;
        match parse(&raw) {
            Ok(value) => return Ok(value),
            Err(reason) => operator.notify(&reason)?,
        }
    }
}

/// Close every open field of `pending`, asking the operator when interactive.
pub fn resolve_interactively(
    pending: PendingConfiguration,
    operator: &mut dyn Operator,
) -> Result<RunConfiguration, ConfigurationError> {
    if !pending.interactive {
        return apply_defaults(pending);
    }

    let vgl_dir = match pending.vgl_dir {
        Some(dir) => dir,
        None => PathBuf::from(ask_until_valid(
            operator,
            "VGL workspace directory",
            Some(DEFAULT_VGL_DIR),
            |raw| {
                if raw.is_empty() {
                    Err("The workspace directory cannot be empty.".to_string())
                } else {
                    Ok(raw.to_string())
                }
            },
        )?),
    };

    let use_gpu = match (pending.use_gpu.forced(), pending.mode.is_low_altitude()) {
        (Some(forced), _) => forced,
        (None, true) => operator.confirm("Run OpenDroneMap on the GPU?", false)?,
        (None, false) => false,
    };

    let download_satellite = match pending.download_satellite.forced() {
        Some(forced) => forced,
        None => operator.confirm("Download satellite reference imagery?", false)?,
    };

    let mut bounding_box = pending.bounding_box;
    let mut stitch_size = pending.stitch_size;
    if download_satellite {
        if bounding_box.is_none() {
            bounding_box = Some(ask_bounding_box(operator)?);
        }
        if stitch_size.is_none() {
            let default = DEFAULT_STITCH_SIZE.to_string();
            stitch_size = Some(ask_until_valid(
                operator,
                "Satellite stitch size",
                Some(&default),
                |raw| parse_count("stitch size", raw).map_err(|err| err.to_string()),
            )?);
        }
    }

    Ok(RunConfiguration {
        mode: pending.mode,
        vgl_dir,
        use_gpu,
        download_satellite,
        bounding_box,
        stitch_size: stitch_size.unwrap_or(DEFAULT_STITCH_SIZE),
        skip_orthophoto_review: pending.skip_orthophoto_review,
        interactive: true,
        dry_run: pending.dry_run,
        verbose: pending.verbose,
    })
}

fn ask_bounding_box(operator: &mut dyn Operator) -> Result<BoundingBox, ConfigurationError> {
    let mut values = [0.0; 4];
    for (slot, field) in values.iter_mut().zip(COORDINATE_FIELDS) {
        *slot = ask_until_valid(
            operator,
            &format!("Satellite bounding box {field} (decimal degrees)"),
            None,
            |raw| parse_coordinate(field, raw).map_err(|err| err.to_string()),
        )?;
    }
    Ok(BoundingBox::new(values[0], values[1], values[2], values[3])?)
}

/// Documented defaults for a non-interactive run. Never blocks.
fn apply_defaults(pending: PendingConfiguration) -> Result<RunConfiguration, ConfigurationError> {
    let download_satellite = pending.download_satellite.forced().unwrap_or(false);
    if download_satellite && pending.bounding_box.is_none() {
        return Err(CoordinateError::Incomplete {
            missing: COORDINATE_FIELDS.to_vec(),
        }
        .into());
    }
    Ok(RunConfiguration {
        mode: pending.mode,
        vgl_dir: pending
            .vgl_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VGL_DIR)),
        use_gpu: pending.use_gpu.forced().unwrap_or(false),
        download_satellite,
        bounding_box: pending.bounding_box,
        stitch_size: pending.stitch_size.unwrap_or(DEFAULT_STITCH_SIZE),
        skip_orthophoto_review: pending.skip_orthophoto_review,
        interactive: false,
        dry_run: pending.dry_run,
        verbose: pending.verbose,
    })
}
