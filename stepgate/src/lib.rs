//! Safety-gated execution of planner-proposed git and file operations.
//!
//! A plan passes through validation, risk classification and policy before
//! any tool runs; write steps are previewed and only executed with an
//! explicit confirmation. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan model, validation, risk,
//!   policy, run states, outcomes). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (filesystem, git, child processes,
//!   audit sinks, config and session persistence).
//! - **[`protocol`]**: The line-delimited request/response contract between
//!   the orchestrator and the tool server.
//!
//! [`orchestrator`] and [`gate`] coordinate the three; [`tools`] holds the
//! concrete tools hosted by the `stepgate-tools` server.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod gate;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
