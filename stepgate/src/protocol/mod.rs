//! Tool protocol: newline-delimited JSON-RPC between the orchestrator and the
//! process hosting concrete tools.
//!
//! - [`envelope`]: request/response shapes and error codes.
//! - [`transport`]: the ordered line channel abstraction.
//! - [`client`]: one-in-flight blocking client with timeouts.
//! - [`server`]: request dispatch and the stdio serve loop.
//! - [`registry`]: tool catalogue with schema-checked arguments.

pub mod client;
pub mod envelope;
pub mod registry;
pub mod server;
pub mod transport;
