//! Server-side tool catalogue.
//!
//! Every tool declares a capability and a JSON Schema for its arguments. The
//! schema is compiled once at registration and checked before the handler
//! runs, so handlers only ever see well-shaped input. Write tools must
//! support a non-mutating preview or they cannot be registered.

use std::collections::BTreeMap;
use std::fmt;

use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::plan::Capability;
use crate::protocol::envelope::{ErrorObject, codes};

/// Whether a call may mutate the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    Preview,
    Execute,
}

impl CallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CallMode::Preview => "preview",
            CallMode::Execute => "execute",
        }
    }
}

/// Catalogue entry, as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub capability: Capability,
    pub input_schema: Value,
    /// Tool can be called in preview mode without side effects.
    pub preview: bool,
}

impl ToolSpec {
    pub fn read(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            capability: Capability::Read,
            input_schema,
            preview: true,
        }
    }

    pub fn write(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            capability: Capability::Write,
            input_schema,
            preview: true,
        }
    }
}

/// Tool-level failure returned by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolError {
    pub code: i64,
    pub message: String,
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: codes::TOOL_FAILED,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: codes::INVALID_ARGUMENTS,
            message: message.into(),
        }
    }

    pub fn sandbox(message: impl Into<String>) -> Self {
        Self {
            code: codes::SANDBOX_VIOLATION,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: codes::RESOURCE_NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<ToolError> for ErrorObject {
    fn from(err: ToolError) -> Self {
        ErrorObject::new(err.code, err.message)
    }
}

/// Concrete tool implementation.
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: &Value, mode: CallMode) -> Result<Value, ToolError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Value, CallMode) -> Result<Value, ToolError> + Send + Sync,
{
    fn call(&self, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
        self(args, mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    Duplicate(String),
    #[error("write tool `{0}` must support preview")]
    MissingPreview(String),
    #[error("tool `{name}` has an invalid input schema: {message}")]
    InvalidSchema { name: String, message: String },
}

struct RegisteredTool {
    spec: ToolSpec,
    validator: Validator,
    handler: Box<dyn ToolHandler>,
}

/// Name -> registered tool, ordered by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        spec: ToolSpec,
        handler: impl ToolHandler + 'static,
    ) -> Result<(), RegistryError> {
        if self.tools.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        if spec.capability == Capability::Write && !spec.preview {
            return Err(RegistryError::MissingPreview(spec.name));
        }
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&spec.input_schema)
            .map_err(|err| RegistryError::InvalidSchema {
                name: spec.name.clone(),
                message: err.to_string(),
            })?;
        debug!(tool = %spec.name, capability = ?spec.capability, "registered tool");
        self.tools.insert(
            spec.name.clone(),
            RegisteredTool {
                spec,
                validator,
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|tool| &tool.spec)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, validate arguments, enforce preview support, then dispatch.
    #[instrument(skip(self, args, mode), fields(mode = mode.as_str()))]
    pub fn call(&self, name: &str, args: &Value, mode: CallMode) -> Result<Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError {
            code: codes::UNKNOWN_TOOL,
            message: format!("unknown tool '{name}'"),
        })?;
        let problems: Vec<String> = tool
            .validator
            .iter_errors(args)
            .map(|err| err.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(ToolError::invalid(format!(
                "invalid arguments for '{name}': {}",
                problems.join("; ")
            )));
        }
        if mode == CallMode::Preview && !tool.spec.preview {
            return Err(ToolError {
                code: codes::PREVIEW_UNSUPPORTED,
                message: format!("tool '{name}' does not support preview"),
            });
        }
        tool.handler.call(args, mode)
    }
}
