use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use rotor_model::{Identity, Slot, natural_cmp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::StoreError, fs::atomic_write};

/// Slot → ordered candidate identities.
///
/// Order matters: rotation walks each list round-robin by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityPool(BTreeMap<Slot, Vec<Identity>>);

impl IdentityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot names in natural order (`node-2` before `node-10`).
    pub fn slots(&self) -> Vec<&str> {
        let mut slots: Vec<&str> = self.0.keys().map(String::as_str).collect();
        slots.sort_by(|a, b| natural_cmp(a, b));
        slots
    }

    /// Every entry for `slot`, placeholders included.
    pub fn entries(&self, slot: &str) -> &[Identity] {
        self.0.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entries for `slot` that can actually be assigned, in pool order.
    pub fn real_identities(&self, slot: &str) -> Vec<Identity> {
        self.entries(slot)
            .iter()
            .filter(|id| id.is_real())
            .cloned()
            .collect()
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.0.contains_key(slot)
    }

    pub fn insert(&mut self, slot: impl Into<Slot>, identities: Vec<Identity>) {
        self.0.insert(slot.into(), identities);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// JSON file holding the [`IdentityPool`].
#[derive(Debug, Clone)]
pub struct PoolStore {
    path: PathBuf,
}

impl PoolStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and validate the pool.
    ///
    /// Fails when the file is absent, is not JSON, or is not an object of string → array of strings.
    pub fn load(&self) -> Result<IdentityPool, StoreError> {
        let raw = fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::Missing {
                path: self.path.clone(),
            },
            _ => StoreError::io(&self.path, e),
        })?;

        let pool: IdentityPool =
            serde_json::from_slice(&raw).map_err(|e| StoreError::malformed(&self.path, e))?;
        debug!(target: "rotor.store", path = %self.path.display(), slots = pool.len(), "identity pool loaded");
        Ok(pool)
    }

    /// Replace the pool file. Only setup flows write the pool; rotation never does.
    pub fn save(&self, pool: &IdentityPool) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(pool).map_err(|e| StoreError::malformed(&self.path, e))?;
        atomic_write(&self.path, &bytes)
    }
}
