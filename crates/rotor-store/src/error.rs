use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("malformed {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("another run holds the lock {}", path.display())]
    Locked { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
