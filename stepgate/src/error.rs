//! Typed failure taxonomy for a gated run.
//!
//! `NeedsClarification` is deliberately absent: it is a control outcome, not
//! an error, and travels as [`crate::core::validator::Validation`] /
//! [`crate::core::policy::Decision`] instead.

use serde::Serialize;
use thiserror::Error;

use crate::core::policy::DenyReason;

/// Malformed plan. Recoverable by the caller resubmitting a fixed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("invalid plan field `{field}`: {message}")]
pub struct ValidationError {
    /// Location of the offending input, e.g. `steps[2].args`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Policy denial. Never retried and never overridable by confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("policy denied plan ({reason}): {detail}")]
pub struct PolicyViolation {
    pub reason: DenyReason,
    pub detail: String,
    pub step_index: Option<usize>,
}

/// Transport-level fault. Aborts the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProtocolError {
    #[error("tool channel closed")]
    ChannelClosed,
    #[error("`{method}` timed out after {after_ms}ms")]
    Timeout { method: String, after_ms: u64 },
    #[error("malformed envelope: {detail}")]
    Malformed { detail: String },
    #[error("server rejected `{method}` (code {code}): {message}")]
    Rejected {
        method: String,
        code: i64,
        message: String,
    },
    #[error("tool channel i/o failed: {detail}")]
    Io { detail: String },
}

/// A single tool call failed. Scoped to one step; the workspace is not
/// presumed corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("tool `{tool}` failed (code {code}): {message}")]
pub struct ToolExecutionError {
    pub tool: String,
    pub code: i64,
    pub message: String,
}

/// Any non-success path of a run, as reported in the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum GateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    ToolExecution(#[from] ToolExecutionError),
}

/// Result of a tool call as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Tool(#[from] ToolExecutionError),
}

impl From<CallError> for GateError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Protocol(err) => GateError::Protocol(err),
            CallError::Tool(err) => GateError::ToolExecution(err),
        }
    }
}
