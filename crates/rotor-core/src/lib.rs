pub mod config;
pub use config::FleetConfig;

pub mod error;
pub use error::{ConfigError, CycleError, OpsError, SlotError};

pub mod runtime;
pub use runtime::{ContainerRuntime, RuntimeError, UnitInspect};

pub mod supervisor;
pub use supervisor::WorkerSupervisor;

pub mod preflight;
pub use preflight::{HostProbe, SystemProbe};

pub mod journal;
pub use journal::Journal;

pub mod engine;
pub use engine::{RotationEngine, next_index};

pub mod ops;
pub use ops::{DeployReport, FleetOps, StartResult, StopReport};

pub mod schedule;
pub use schedule::CronSchedule;
