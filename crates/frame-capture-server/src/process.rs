//! Run an external tool to completion with bounded runtime.
//!
//! Stdout and stderr are both drained so a chatty child can never block on a
//! full pipe, and the child is killed if it outlives the timeout.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Bytes of stderr kept in failure messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// Program plus arguments, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str().to_string_lossy())
            .chain(self.args.iter().map(|a| a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful run.
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("wait for {program:?}: {source}")]
    Wait {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("{program:?} timed out after {timeout:?}")]
    TimedOut { program: PathBuf, timeout: Duration },
    #[error("{program:?} exited with {}: {stderr}", exit_label(.code))]
    Failed {
        program: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Spawn `spec`, wait for it to exit, and map a nonzero exit to an error.
pub async fn run_to_completion(
    spec: &ProcessSpec,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    tracing::debug!(command = %spec.display(), "running external process");
    let child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    // Dropping the timed-out future drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ProcessError::Wait {
            program: spec.program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(ProcessError::TimedOut {
                program: spec.program.clone(),
                timeout,
            });
        }
    };

    if !output.status.success() {
        return Err(ProcessError::Failed {
            program: spec.program.clone(),
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(ProcessOutput {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
