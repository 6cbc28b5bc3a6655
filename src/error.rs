//! Error taxonomy for the geolocalization pipeline.
//!
//! Every variant is fatal to the run. The split mirrors what the operator has
//! to fix: arguments, environment, a failing external stage, or a stage that
//! claimed success without producing its artifact.
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Bad, missing, or conflicting arguments and operator answers.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown option '{0}' (see --help)")]
    UnknownOption(String),
    #[error("invalid argument '{0}': not an existing image file or a ground sample distance")]
    InvalidArgument(String),
    #[error("too many arguments: unexpected '{0}'")]
    TooManyArguments(String),
    #[error("missing argument: {0} (see --help)")]
    MissingArgument(&'static str),
    #[error("invalid value '{value}' for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error(
        "ground sample distance {0} cm/px is too coarse for low-altitude mode (must be below 20); \
         pass a single image for high-altitude mode instead"
    )]
    GsdOutOfRange(f64),
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),
    #[error("operator input closed while waiting for {0}")]
    InputClosed(String),
    #[error("operator channel failed")]
    Operator(#[source] io::Error),
    #[error("{0}")]
    Usage(String),
}

/// Bounding-box violations. Coordinates are validated as a unit.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("incomplete bounding box: missing {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },
    #[error("invalid coordinate '{value}' for {field}: not a decimal number")]
    Malformed { field: &'static str, value: String },
    #[error("coordinate {value} for {field} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// An unmet requirement of the execution environment.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("required program '{program}' was not found on PATH")]
    MissingProgram { program: String },
    #[error("container runtime '{runtime}' is not healthy: {detail}")]
    RuntimeUnhealthy { runtime: String, detail: String },
    #[error("ODM project directory {} does not exist", .path.display())]
    MissingDirectory { path: PathBuf },
    #[error("ODM project {} has no images/ subdirectory", .path.display())]
    MissingImagesDirectory { path: PathBuf },
    #[error("no input images in {} (accepted extensions: {accepted})", .path.display())]
    NoInputImages { path: PathBuf, accepted: String },
    #[error("satellite download requested but {variable} is not set in the environment")]
    MissingSecret { variable: String },
    #[error("{} cannot be mounted into a container: {reason}", .path.display())]
    UnmountablePath { path: PathBuf, reason: String },
}

/// Every precondition that failed during one check.
#[derive(Debug)]
pub struct UnmetPreconditions(pub Vec<PreconditionError>);

impl fmt::Display for UnmetPreconditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "unmet preconditions: {}", rendered.join("; "))
    }
}

impl std::error::Error for UnmetPreconditions {}

impl From<PreconditionError> for UnmetPreconditions {
    fn from(error: PreconditionError) -> Self {
        Self(vec![error])
    }
}

/// Why a stage did not complete.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("could not launch: {0}")]
    Launch(#[source] io::Error),
    #[error("exited with {}", render_exit_code(*.0))]
    ExitStatus(Option<i32>),
    #[error("invalid invocation: {0}")]
    Invalid(String),
}

fn render_exit_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// An external stage failed to launch or exited non-zero.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {failure}")]
pub struct StageExecutionError {
    pub stage: &'static str,
    pub failure: StageFailure,
}

/// An external stage reported success but its expected output is absent.
#[derive(Debug, Error)]
#[error("stage '{stage}' reported success but did not produce {}", .path.display())]
pub struct MissingArtifactError {
    pub stage: &'static str,
    pub path: PathBuf,
}

/// Any error that aborts the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Precondition(#[from] UnmetPreconditions),
    #[error(transparent)]
    Stage(#[from] StageExecutionError),
    #[error(transparent)]
    MissingArtifact(#[from] MissingArtifactError),
    #[error("{action} {}", .path.display())]
    Workspace {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<CoordinateError> for PipelineError {
    fn from(error: CoordinateError) -> Self {
        Self::Configuration(error.into())
    }
}

/// Terminal failure state: the last state reached plus the error that ended the run.
#[derive(Debug, Error)]
#[error("pipeline stopped after reaching {last_state}")]
pub struct PipelineFailure {
    pub last_state: PipelineState,
    #[source]
    pub error: PipelineError,
}
