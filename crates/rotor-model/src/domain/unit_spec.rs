use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    CONTAINER_LOG_PATH, ENV_LABEL, ENV_LOG_FILE, ENV_NODE_ID, Identity, KeyValue, MemoryLimit,
    MemoryUsage, Slot, UnitStatus,
};

/// Everything the runtime needs to create one execution unit for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSpec {
    /// Slot name; also the unit name.
    pub slot: Slot,
    /// Worker image reference.
    pub image: String,
    /// Identity bound to the worker process.
    pub identity: Identity,
    /// Memory ceiling (swap ceiling is the same value).
    pub memory: MemoryLimit,
    /// Host file bind-mounted as the worker's log.
    pub log_path: PathBuf,
    /// Display label shown by the worker.
    pub label: String,
}

impl UnitSpec {
    /// Env bindings passed to the unit, in a stable order.
    pub fn env(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new(ENV_NODE_ID, self.identity.as_str()),
            KeyValue::new(ENV_LOG_FILE, CONTAINER_LOG_PATH),
            KeyValue::new(ENV_LABEL, self.label.as_str()),
        ]
    }

    /// `host:container` bind-mount of the log file.
    pub fn log_mount(&self) -> String {
        format!("{}:{}", self.log_path.display(), CONTAINER_LOG_PATH)
    }
}

/// Live view of one managed unit, as reported by inventory queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitInfo {
    pub slot: Slot,
    pub status: UnitStatus,
    /// Identity read back from the unit itself, not from rotation state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    pub memory_limit: MemoryLimit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<MemoryUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> UnitSpec {
        UnitSpec {
            slot: "nexus-node-1".into(),
            image: "nexus-node:latest".into(),
            identity: Identity::from("1234"),
            memory: MemoryLimit::from_mib(2048),
            log_path: PathBuf::from("/var/log/rotor/nexus-node-1.log"),
            label: "nexus-node-1".into(),
        }
    }

    #[test]
    fn env_carries_identity_and_log_path() {
        let env = spec().env();
        let bindings: Vec<_> = env.iter().map(KeyValue::to_binding).collect();
        assert_eq!(
            bindings,
            vec![
                "NODE_ID=1234".to_string(),
                format!("LOG_FILE={CONTAINER_LOG_PATH}"),
                "NODE_LABEL=nexus-node-1".to_string(),
            ]
        );
    }

    #[test]
    fn log_mount_maps_host_file_into_unit() {
        assert_eq!(
            spec().log_mount(),
            format!("/var/log/rotor/nexus-node-1.log:{CONTAINER_LOG_PATH}")
        );
    }
}
