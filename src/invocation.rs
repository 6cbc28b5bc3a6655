//! Structured descriptors for external stage commands.
//!
//! An invocation keeps its arguments, environment passthrough and volume
//! mounts apart until [`StageInvocation::argv`] renders them for execution.
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

pub(crate) const MAX_ARG_LEN: usize = 4096;

/// The external steps the pipeline knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RuntimeProbe,
    Orthophoto,
    OrthophotoConversion,
    SatelliteDownload,
    Matching,
}

impl Stage {
    /// Human-readable stage name used in logs and errors.
    pub fn label(self) -> &'static str {
        match self {
            Stage::RuntimeProbe => "container runtime probe",
            Stage::Orthophoto => "orthophoto generation",
            Stage::OrthophotoConversion => "orthophoto conversion",
            Stage::SatelliteDownload => "satellite download",
            Stage::Matching => "visual matching",
        }
    }
}

/// Host directory exposed inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
}

/// Where the command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Host {
        program: String,
    },
    Container {
        runtime: String,
        image: String,
        gpus: bool,
    },
}

/// One fully described external command.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    stage: Stage,
    target: Target,
    args: Vec<String>,
    env_passthrough: Vec<String>,
    mounts: Vec<VolumeMount>,
    quiet: bool,
}

impl StageInvocation {
    /// Start describing a program run directly on the host.
    pub fn host(stage: Stage, program: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder::new(
            stage,
            Target::Host {
                program: program.into(),
            },
        )
    }

    /// Start describing a throwaway container run (`<runtime> run --rm ...`).
    pub fn container(
        stage: Stage,
        runtime: impl Into<String>,
        image: impl Into<String>,
    ) -> InvocationBuilder {
        InvocationBuilder::new(
            stage,
            Target::Container {
                runtime: runtime.into(),
                image: image.into(),
                gpus: false,
            },
        )
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[cfg(test)]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Arguments passed to the program or the container entrypoint.
    #[cfg(test)]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env_passthrough(&self) -> &[String] {
        &self.env_passthrough
    }

    pub fn mounts(&self) -> &[VolumeMount] {
        &self.mounts
    }

    /// Whether the command's own output should be discarded.
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    /// Program launched on the host.
    pub fn program(&self) -> &str {
        match &self.target {
            Target::Host { program } => program,
            Target::Container { runtime, .. } => runtime,
        }
    }

    /// Arguments after the program, with container options rendered in.
    pub fn argv(&self) -> Vec<String> {
        match &self.target {
            Target::Host { .. } => self.args.clone(),
            Target::Container { image, gpus, .. } => {
                let mut argv = vec!["run".to_string(), "--rm".to_string()];
                if *gpus {
                    argv.push("--gpus".to_string());
                    argv.push("all".to_string());
                }
                for mount in &self.mounts {
                    argv.push("-v".to_string());
                    argv.push(format!("{}:{}", mount.host.display(), mount.container));
                }
                for name in &self.env_passthrough {
                    argv.push("-e".to_string());
                    argv.push(name.clone());
                }
                argv.push(image.clone());
                argv.extend(self.args.iter().cloned());
                argv
            }
        }
    }

    /// Shell-quoted command line for logs and manifests.
    pub fn command_line(&self) -> String {
        let mut words = vec![self.program().to_string()];
        words.extend(self.argv());
        shell_words::join(words)
    }

    /// Build the process command; environment passthrough relies on inheritance.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(self.program());
        command.args(self.argv());
        command
    }
}

/// Incrementally describe an invocation; [`InvocationBuilder::build`] validates it once.
#[derive(Debug)]
pub struct InvocationBuilder {
    invocation: StageInvocation,
}

impl InvocationBuilder {
    fn new(stage: Stage, target: Target) -> Self {
        Self {
            invocation: StageInvocation {
                stage,
                target,
                args: Vec::new(),
                env_passthrough: Vec::new(),
                mounts: Vec::new(),
                quiet: false,
            },
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.invocation.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Forward a host environment variable by name; its value is never rendered.
    pub fn env_passthrough(mut self, name: impl Into<String>) -> Self {
        self.invocation.env_passthrough.push(name.into());
        self
    }

    pub fn mount(mut self, host: &Path, container: impl Into<String>) -> Self {
        self.invocation.mounts.push(VolumeMount {
            host: host.to_path_buf(),
            container: container.into(),
        });
        self
    }

    /// Request every GPU for a container target.
    pub fn gpus(mut self, enabled: bool) -> Self {
        if let Target::Container { gpus, .. } = &mut self.invocation.target {
            *gpus = enabled;
        }
        self
    }

    pub fn quiet(mut self) -> Self {
        self.invocation.quiet = true;
        self
    }

    pub fn build(self) -> Result<StageInvocation, Vec<String>> {
        match validate_invocation(&self.invocation) {
            Some(errors) => Err(errors),
            None => Ok(self.invocation),
        }
    }
}

fn env_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn validate_invocation(invocation: &StageInvocation) -> Option<Vec<String>> {
    let mut errors = Vec::new();
    if invocation.program().is_empty() {
        errors.push("program is empty".to_string());
    }
    let is_container = matches!(invocation.target, Target::Container { .. });
    if !is_container && !(invocation.mounts.is_empty() && invocation.env_passthrough.is_empty()) {
        errors.push("mounts and environment passthrough need a container target".to_string());
    }
    for (idx, arg) in invocation.args.iter().enumerate() {
        if arg.len() > MAX_ARG_LEN {
            errors.push(format!("args[{idx}] exceeds max length ({MAX_ARG_LEN})"));
        }
        if arg.contains('\0') {
            errors.push(format!("args[{idx}] contains NUL"));
        }
    }
    for name in &invocation.env_passthrough {
        if !env_name().is_match(name) {
            errors.push(format!("invalid environment variable name: {name}"));
        }
    }
    for mount in &invocation.mounts {
        if !mount.host.is_absolute() {
            errors.push(format!(
                "mount source must be absolute: {}",
                mount.host.display()
            ));
        }
        if !mount.container.starts_with('/') || mount.container.contains(':') {
            errors.push(format!("invalid mount target: {}", mount.container));
        }
        if mount.host.to_string_lossy().contains(':') {
            errors.push(format!(
                "mount source cannot contain ':': {}",
                mount.host.display()
            ));
        }
    }

    if errors.is_empty() {
        None
    } else {
        Some(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_rendering_orders_options_before_image() {
        let invocation = StageInvocation::container(Stage::Matching, "docker", "vgl:latest")
            .mount(Path::new("/srv/ws"), "/data")
            .env_passthrough("VGL_SATELLITE_API_KEY")
            .gpus(true)
            .args(["localize", "--query", "/data/query"])
            .build()
            .expect("valid invocation");

        assert_eq!(invocation.program(), "docker");
        assert_eq!(
            invocation.argv(),
            vec![
                "run",
                "--rm",
                "--gpus",
                "all",
                "-v",
                "/srv/ws:/data",
                "-e",
                "VGL_SATELLITE_API_KEY",
                "vgl:latest",
                "localize",
                "--query",
                "/data/query",
            ]
        );
    }

    #[test]
    fn host_rendering_is_plain() {
        let invocation = StageInvocation::host(Stage::OrthophotoConversion, "gdal_translate")
            .args(["-of", "PNG", "/p/in.tif", "/p/out file.png"])
            .build()
            .expect("valid invocation");
        assert_eq!(
            invocation.command_line(),
            "gdal_translate -of PNG /p/in.tif '/p/out file.png'"
        );
    }

    #[test]
    fn relative_mounts_are_rejected() {
        let errors = StageInvocation::container(Stage::Matching, "docker", "vgl")
            .mount(Path::new("relative/ws"), "/data")
            .build()
            .expect_err("relative mount");
        assert!(errors.iter().any(|e| e.contains("must be absolute")));
    }

    #[test]
    fn host_targets_cannot_mount_or_pass_env() {
        let errors = StageInvocation::host(Stage::OrthophotoConversion, "gdal_translate")
            .env_passthrough("HOME")
            .build()
            .expect_err("host with env");
        assert!(errors.iter().any(|e| e.contains("container target")));
    }

    #[test]
    fn bad_env_names_and_nul_args_are_rejected() {
        let errors = StageInvocation::container(Stage::SatelliteDownload, "docker", "vgl")
            .env_passthrough("API-KEY")
            .arg("bad\0arg")
            .build()
            .expect_err("invalid");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn stage_labels_are_human_readable() {
        assert_eq!(Stage::Orthophoto.label(), "orthophoto generation");
        assert_eq!(Stage::Matching.label(), "visual matching");
    }
}
