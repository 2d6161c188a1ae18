use thiserror::Error;

/// Reasons the process-wide diagnostic subscriber could not be installed.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, expected text, json or journald")]
    InvalidFormat(String),
    #[error("journald output needs Linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("logger setup failed: {0}")]
    InitializationFailed(String),
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidLogLevel { directive: String, reason: String },
}

impl LoggerError {
    /// Classify a `try_init` failure; a second install is reported distinctly.
    pub(crate) fn from_init(e: impl std::fmt::Display) -> Self {
        let msg = e.to_string();
        if msg.contains("SetGlobalDefaultError") || msg.contains("global default") {
            Self::AlreadyInitialized
        } else {
            Self::InitializationFailed(msg)
        }
    }
}
