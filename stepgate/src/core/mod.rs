//! Deterministic, pure logic of the gate.
//!
//! Core modules must be free of I/O side effects. Path containment is the one
//! question the policy engine cannot answer alone; it asks through the
//! [`policy::PathSandbox`] seam instead of touching the filesystem.

pub mod outcome;
pub mod plan;
pub mod policy;
pub mod risk;
pub mod session;
pub mod state;
pub mod validator;
