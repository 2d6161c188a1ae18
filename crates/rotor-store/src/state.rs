use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use rotor_model::Slot;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::StoreError, fs::atomic_write};

/// Slot → index of the identity currently assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RotationState(BTreeMap<Slot, usize>);

impl RotationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored index, `None` on first encounter.
    pub fn get(&self, slot: &str) -> Option<usize> {
        self.0.get(slot).copied()
    }

    /// Stored index or `0`.
    pub fn index_or_default(&self, slot: &str) -> usize {
        self.get(slot).unwrap_or(0)
    }

    pub fn set(&mut self, slot: impl Into<Slot>, index: usize) {
        self.0.insert(slot.into(), index);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// JSON file holding the [`RotationState`].
///
/// A missing file is not fatal: it reads as empty and is recreated on the next save.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RotationState, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(target: "rotor.store", path = %self.path.display(), "rotation state missing; starting from empty state");
                return Ok(RotationState::new());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        serde_json::from_slice(&raw).map_err(|e| StoreError::malformed(&self.path, e))
    }

    /// Atomically replace the state file.
    pub fn save(&self, state: &RotationState) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|e| StoreError::malformed(&self.path, e))?;
        atomic_write(&self.path, &bytes)
    }

    /// Create an empty state file if none exists.
    pub fn ensure(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        self.save(&RotationState::new())
    }

    /// Persist `index` for `slot`, leaving every other entry as it is on disk.
    pub fn commit(&self, slot: &str, index: usize) -> Result<(), StoreError> {
        let mut state = self.load()?;
        state.set(slot, index);
        self.save(&state)?;
        debug!(target: "rotor.store", slot, index, "rotation index committed");
        Ok(())
    }
}
