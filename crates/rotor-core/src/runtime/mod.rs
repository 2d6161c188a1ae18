//! Seam between the fleet logic and the container runtime.
//!
//! The supervisor, engine and ops queries only ever talk to [`ContainerRuntime`].
//! `rotor-exec` provides the CLI-backed implementation; tests use an in-memory fake.
use std::{collections::HashMap, path::Path, time::Duration};

use async_trait::async_trait;
use rotor_model::{ENV_NODE_ID, Identity, KeyValue, MemoryLimit, MemoryUsage, UnitSpec, UnitStatus};
use thiserror::Error;

#[cfg(test)]
pub(crate) mod fake;

#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// The runtime daemon/CLI could not be reached at all.
    #[error("runtime unreachable: {0}")]
    Unreachable(String),

    /// The runtime answered and refused the request.
    #[error("runtime rejected {op}: {diagnostic}")]
    Rejected { op: &'static str, diagnostic: String },

    #[error("runtime {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Output could not be understood.
    #[error("unexpected runtime output for {op}: {reason}")]
    Parse { op: &'static str, reason: String },
}

/// What the runtime reports about one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInspect {
    pub name: String,
    pub status: UnitStatus,
    /// Times the runtime restarted the unit's process since it was created.
    pub restart_count: u32,
    pub env: Vec<KeyValue>,
    /// Applied ceiling; `Unlimited` when the unit carries none.
    pub memory: MemoryLimit,
    pub image: String,
}

impl UnitInspect {
    /// Last binding for `key` wins, matching how runtimes resolve duplicate env entries.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Identity bound to the unit.
    pub fn identity(&self) -> Option<Identity> {
        self.env_value(ENV_NODE_ID)
            .filter(|v| !v.is_empty())
            .map(Identity::from)
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Short runtime name for logs.
    fn name(&self) -> &'static str;

    /// Cheap round trip proving the runtime is responsive.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Force-remove the unit named `name`. `Ok(false)` when there was none.
    async fn remove(&self, name: &str) -> Result<bool, RuntimeError>;

    /// Create and start a unit. Success only means the runtime accepted the request.
    async fn create(&self, spec: &UnitSpec) -> Result<String, RuntimeError>;

    /// `Ok(None)` when no unit has that name.
    async fn inspect(&self, name: &str) -> Result<Option<UnitInspect>, RuntimeError>;

    /// Names of all units (running or not) whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, RuntimeError>;

    /// Live memory usage of the given running units.
    async fn stats(&self, names: &[String]) -> Result<HashMap<String, MemoryUsage>, RuntimeError>;

    /// Build (or rebuild) the worker image from a context directory.
    async fn build_image(&self, tag: &str, context: &Path) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_reads_last_node_id_binding() {
        let unit = UnitInspect {
            name: "nexus-node-1".into(),
            status: UnitStatus::Running,
            restart_count: 0,
            env: vec![
                KeyValue::new("PATH", "/usr/bin"),
                KeyValue::new(ENV_NODE_ID, "old"),
                KeyValue::new(ENV_NODE_ID, "new"),
            ],
            memory: MemoryLimit::Unlimited,
            image: "nexus-node:latest".into(),
        };
        assert_eq!(unit.identity(), Some(Identity::from("new")));
    }

    #[test]
    fn empty_node_id_is_no_identity() {
        let unit = UnitInspect {
            name: "nexus-node-1".into(),
            status: UnitStatus::Running,
            restart_count: 0,
            env: vec![KeyValue::new(ENV_NODE_ID, "")],
            memory: MemoryLimit::Unlimited,
            image: "nexus-node:latest".into(),
        };
        assert_eq!(unit.identity(), None);
    }
}
