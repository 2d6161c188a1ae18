//! Shared domain types for the rotor fleet manager.
//!
//! Everything here is plain data: slots, identities, memory quantities,
//! execution-unit specs and the reports produced by a rotation cycle.
//! No I/O happens in this crate.

mod domain;
pub use domain::*;
