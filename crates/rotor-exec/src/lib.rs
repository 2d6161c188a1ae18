//! Process-backed container runtime for the rotor fleet.
mod error;
pub use error::{ExecError, ExecResult};

mod util;
pub use util::{cmd_program, run_capture};

pub mod docker;
pub use docker::DockerCli;

pub mod prelude {
    pub use crate::DockerCli;
    pub use crate::error::{ExecError, ExecResult};
}
