//! Append-only operational logs kept next to the worker logs.
//!
//! Every cycle event goes to the rotation log; failures are also copied to the failure log.
//! Lines look like `[2026-01-01T03:00:00+00:00] INFO slot nexus-node-1 rotated`.
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    rotation_log: PathBuf,
    failure_log: PathBuf,
}

impl Journal {
    /// Create both files (and their directory) when absent.
    pub fn open(rotation_log: impl Into<PathBuf>, failure_log: impl Into<PathBuf>) -> io::Result<Self> {
        let journal = Self {
            rotation_log: rotation_log.into(),
            failure_log: failure_log.into(),
        };
        for path in [&journal.rotation_log, &journal.failure_log] {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(path)?;
        }
        Ok(journal)
    }

    pub fn rotation_log(&self) -> &Path {
        &self.rotation_log
    }

    pub fn failure_log(&self) -> &Path {
        &self.failure_log
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.append(&self.rotation_log, Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.append(&self.rotation_log, Level::Warn, message.as_ref());
    }

    /// Written to both logs.
    pub fn failure(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.append(&self.rotation_log, Level::Error, message);
        self.append(&self.failure_log, Level::Error, message);
    }

    fn append(&self, path: &Path, level: Level, message: &str) {
        let line = format_line(now_rfc3339(), level, message);
        let res = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        // The journal must never take a cycle down with it.
        if let Err(e) = res {
            warn!(target: "rotor.journal", path = %path.display(), error = %e, "journal write failed");
        }
    }
}

fn format_line(ts: String, level: Level, message: &str) -> String {
    // One event per line, whatever the message contains.
    let message = message.replace(['\n', '\r'], " ");
    format!("[{ts}] {} {message}\n", level.as_str())
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
