//! Process-spawning seam: lets archive creation run a real executable in
//! production and a recording double in tests.

use std::{ffi::OsString, path::Path, process::Command};

use anyhow::{Context, Result};

/// Exit code and captured streams of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub trait ProcessRunner {
    /// Run `program` in `working_dir` with `args`, blocking until it exits.
    /// Spawn failures are errors; a non-zero exit is data, not an error.
    fn run(&self, program: &str, working_dir: &Path, args: &[OsString]) -> Result<ProcessOutput>;
}

/// Runs executables on the host system with captured output.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, working_dir: &Path, args: &[OsString]) -> Result<ProcessOutput> {
        let output = Command::new(program)
            .current_dir(working_dir)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute {}", program))?;

        Ok(ProcessOutput {
            // Killed-by-signal has no code; report it as a plain failure.
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
