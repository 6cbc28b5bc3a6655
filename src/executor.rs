//! Uniform execution of stage invocations, with dry-run support.
use serde::Serialize;
use std::io;
use std::process::Stdio;
use std::time::Instant;

use crate::error::{StageExecutionError, StageFailure};
use crate::invocation::{Stage, StageInvocation};

/// Exit information of a finished process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

/// Launches processes. The seam tests use to stand in for containers.
pub trait CommandRunner {
    fn run(&mut self, invocation: &StageInvocation) -> io::Result<ProcessExit>;
}

/// Runs invocations as real child processes, blocking until they exit.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &StageInvocation) -> io::Result<ProcessExit> {
        let mut command = invocation.to_command();
        command.stdin(Stdio::null());
        if invocation.quiet() {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let status = command.status()?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

/// One entry of the execution transcript.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedStage {
    pub stage: Stage,
    pub command: String,
    pub dry_run: bool,
    pub elapsed_ms: u128,
}

/// Executes invocations through a runner, or only logs them in dry-run.
pub struct StageExecutor<'r> {
    runner: &'r mut dyn CommandRunner,
    dry_run: bool,
    transcript: Vec<ExecutedStage>,
}

impl<'r> StageExecutor<'r> {
    pub fn new(runner: &'r mut dyn CommandRunner, dry_run: bool) -> Self {
        Self {
            runner,
            dry_run,
            transcript: Vec::new(),
        }
    }

    /// Successfully executed (or dry-run) stages, in order.
    pub fn into_transcript(self) -> Vec<ExecutedStage> {
        self.transcript
    }

    /// Run one stage. Any launch failure or non-zero exit is an error; no retry.
    pub fn execute(&mut self, invocation: &StageInvocation) -> Result<(), StageExecutionError> {
        let stage = invocation.stage();
        let command = invocation.command_line();

        if self.dry_run {
            tracing::info!(stage = stage.label(), %command, "dry-run: would execute");
            self.transcript.push(ExecutedStage {
                stage,
                command,
                dry_run: true,
                elapsed_ms: 0,
            });
            return Ok(());
        }

        tracing::info!(stage = stage.label(), "starting stage");
        tracing::debug!(
            stage = stage.label(),
            %command,
            mounts = invocation.mounts().len(),
            env = ?invocation.env_passthrough(),
            "stage command"
        );
        let start = Instant::now();
        let exit = self
            .runner
            .run(invocation)
            .map_err(|err| StageExecutionError {
                stage: stage.label(),
                failure: StageFailure::Launch(err),
            })?;
        let elapsed_ms = start.elapsed().as_millis();

        if !exit.success() {
            return Err(StageExecutionError {
                stage: stage.label(),
                failure: StageFailure::ExitStatus(exit.code),
            });
        }

        tracing::info!(stage = stage.label(), elapsed_ms, "stage complete");
        self.transcript.push(ExecutedStage {
            stage,
            command,
            dry_run: false,
            elapsed_ms,
        });
        Ok(())
    }
}
