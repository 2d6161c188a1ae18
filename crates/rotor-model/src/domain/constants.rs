/// Pool entry meaning "not filled in yet". Never treated as a real identity.
pub const PLACEHOLDER_IDENTITY: &str = "PLACEHOLDER";

/// Default slot naming prefix; slots are `<prefix><n>` with `n >= 1`.
pub const DEFAULT_SLOT_PREFIX: &str = "nexus-node-";

/// Env binding carrying the active identity inside the unit.
pub const ENV_NODE_ID: &str = "NODE_ID";

/// Env binding carrying the in-unit path of the mounted log file.
pub const ENV_LOG_FILE: &str = "LOG_FILE";

/// Env binding carrying the human-readable display label.
pub const ENV_LABEL: &str = "NODE_LABEL";

/// Mount point of the slot's host log file inside the unit.
pub const CONTAINER_LOG_PATH: &str = "/app/logs/node.log";

/// Runtime label attached to every unit created by rotor.
pub const LABEL_SLOT: &str = "rotor.slot";
