mod kv;
pub use kv::KeyValue;

mod constants;
pub use constants::{
    CONTAINER_LOG_PATH, DEFAULT_SLOT_PREFIX, ENV_LABEL, ENV_LOG_FILE, ENV_NODE_ID,
    LABEL_SLOT, PLACEHOLDER_IDENTITY,
};

mod identity;
pub use identity::Identity;

mod memory;
pub use memory::{MemoryLimit, MemoryUsage, QuantityError, format_binary, parse_quantity};

mod slot;
pub use slot::{SlotNaming, natural_cmp};

mod unit_status;
pub use unit_status::UnitStatus;

mod unit_spec;
pub use unit_spec::{UnitInfo, UnitSpec};

mod report;
pub use report::{CycleReport, SlotPhase, SlotReport};

/// Name of a worker position (e.g. `nexus-node-3`).
///
/// A slot hosts at most one execution unit at a time; the unit carries the slot name.
pub type Slot = String;
