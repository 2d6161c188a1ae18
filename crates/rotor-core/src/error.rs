use std::path::PathBuf;

use rotor_model::{SlotPhase, QuantityError};
use rotor_store::StoreError;
use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that abort a whole rotation cycle before any slot is touched.
#[derive(Error, Debug)]
pub enum CycleError {
    /// Pool or state file missing or corrupt.
    #[error("configuration error: {0}")]
    Config(#[source] StoreError),

    /// Host or runtime not fit to rotate (memory, disk, runtime unreachable).
    #[error("resource check failed: {0}")]
    Resource(String),

    #[error("another rotation run holds {}", .0.display())]
    AlreadyRunning(PathBuf),
}

/// Errors scoped to one slot; the cycle continues with the next slot.
#[derive(Error, Debug)]
pub enum SlotError {
    #[error("failed to destroy unit {slot}: {reason}")]
    Destroy { slot: String, reason: String },

    #[error("failed to create unit {slot}: {reason}")]
    Create { slot: String, reason: String },

    #[error("unit {slot} did not become healthy: {reason}")]
    Health { slot: String, reason: String },

    /// Unit is running the new identity but the index was not persisted.
    #[error("failed to commit rotation index for {slot}: {reason}")]
    Commit { slot: String, reason: String },
}

impl SlotError {
    /// Terminal phase this error maps to.
    pub fn phase(&self) -> SlotPhase {
        match self {
            SlotError::Destroy { .. } => SlotPhase::DestroyFailed,
            SlotError::Create { .. } => SlotPhase::CreateFailed,
            SlotError::Health { .. } => SlotPhase::HealthFailed,
            SlotError::Commit { .. } => SlotPhase::CommitFailed,
        }
    }
}

/// Errors from ad-hoc fleet operations.
#[derive(Error, Debug)]
pub enum OpsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no unit for slot {0}")]
    NotFound(String),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid memory quantity: {0}")]
    Quantity(#[from] QuantityError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
