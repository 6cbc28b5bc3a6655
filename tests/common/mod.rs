//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Isolated directory with its own `bin/` search path and no inherited environment.
pub struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("bin")).expect("create bin dir");
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root().join("bin")
    }

    /// Log of every fake runtime invocation, one line per call.
    pub fn runtime_log(&self) -> String {
        fs::read_to_string(self.root().join("runtime.log")).unwrap_or_default()
    }

    /// Install a fake `docker` that records its arguments and exits 0.
    #[cfg(unix)]
    pub fn with_fake_runtime(self) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\nexit 0\n",
            self.root().join("runtime.log").display()
        );
        let path = self.bin_dir().join("docker");
        fs::write(&path, script).expect("write fake runtime");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake runtime");
        self
    }

    pub fn write_image(&self, name: &str) -> PathBuf {
        let path = self.root().join(name);
        fs::write(&path, b"jpeg").expect("write image");
        path
    }

    pub fn write_odm_project(&self, name: &str) -> PathBuf {
        let root = self.root().join(name);
        fs::create_dir_all(root.join("images")).expect("create images dir");
        fs::write(root.join("images").join("DJI_0001.JPG"), b"jpeg").expect("write capture");
        root
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_vgl-pipeline"));
        command
            .env_clear()
            .env("PATH", self.bin_dir())
            .env("LC_ALL", "C")
            .current_dir(self.root())
            .stdin(Stdio::null());
        command
    }

    pub fn run(&self, args: &[&str]) -> RunResult {
        self.run_with(args, &[])
    }

    pub fn run_with(&self, args: &[&str], env: &[(&str, &str)]) -> RunResult {
        let mut command = self.command();
        command.args(args);
        for (name, value) in env {
            command.env(name, value);
        }
        RunResult::from(command.output().expect("run vgl-pipeline"))
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Exit code plus decoded output of one binary run.
#[derive(Debug)]
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for RunResult {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}
