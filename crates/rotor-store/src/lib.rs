//! Durable stores for the rotation engine.
//!
//! - [`PoolStore`]: slot → ordered identity list. Read-mostly, edited by the operator.
//! - [`StateStore`]: slot → currently assigned index. Written by the engine after each
//!   confirmed rotation, always through [`atomic_write`].
//! - [`RunLock`]: exclusive `flock` guard preventing overlapping rotation runs.

mod error;
pub use error::StoreError;

mod fs;
pub use fs::atomic_write;

mod pool;
pub use pool::{IdentityPool, PoolStore};

mod state;
pub use state::{RotationState, StateStore};

mod lock;
pub use lock::{RunLock, RunLockGuard};
