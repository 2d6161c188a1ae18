use std::time::Duration;

use rotor_core::RuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("program not found: {0}")]
    MissingProgram(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("non-zero exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("killed by signal")]
    KilledBySignal,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Daemon-down diagnostics printed by the docker CLI.
const UNREACHABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "Is the docker daemon running",
    "error during connect",
];

impl ExecError {
    /// `true` when the runtime reported that the named object does not exist.
    pub fn is_no_such(&self) -> bool {
        matches!(self, ExecError::NonZeroExit { stderr, .. } if stderr.contains("No such"))
    }

    /// Classify for the runtime seam.
    pub fn into_runtime(self, op: &'static str) -> RuntimeError {
        match self {
            ExecError::MissingProgram(p) => RuntimeError::Unreachable(format!("{p} not found")),
            ExecError::NonZeroExit { stderr, .. }
                if UNREACHABLE_MARKERS.iter().any(|m| stderr.contains(m)) =>
            {
                RuntimeError::Unreachable(stderr)
            }
            ExecError::NonZeroExit { code, stderr } => RuntimeError::Rejected {
                op,
                diagnostic: if stderr.is_empty() {
                    format!("exit code {code}")
                } else {
                    stderr
                },
            },
            ExecError::Timeout(after) => RuntimeError::Timeout { op, after },
            other => RuntimeError::Unreachable(other.to_string()),
        }
    }
}
