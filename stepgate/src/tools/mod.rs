//! Concrete tools hosted by the `stepgate-tools` server.
//!
//! Every write tool honors [`CallMode::Preview`] by reporting what it would
//! do without touching the workspace. Previews are lenient about workspace
//! state an earlier step may still change (nothing staged yet, branch not
//! created yet) and report it instead; execution enforces it.

pub mod files;
pub mod git;
pub mod resources;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::core::policy::DEFAULT_SENSITIVE_NAMES;
use crate::io::git::Git;
use crate::io::workspace::WorkspaceRoot;
use crate::protocol::registry::{CallMode, RegistryError, ToolError, ToolRegistry, ToolSpec};
use crate::protocol::server::ToolServer;

/// Default cap on bytes returned by reads.
pub const DEFAULT_LIMIT_BYTES: usize = 256 * 1024;

/// Shared state for all tool handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    root: WorkspaceRoot,
    git: Git,
    sensitive_names: BTreeSet<String>,
    limit_bytes: usize,
}

impl ToolContext {
    pub fn new(root: WorkspaceRoot) -> Self {
        let git = Git::new(root.path());
        Self {
            root,
            git,
            sensitive_names: DEFAULT_SENSITIVE_NAMES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            limit_bytes: DEFAULT_LIMIT_BYTES,
        }
    }

    pub fn with_limit_bytes(mut self, limit_bytes: usize) -> Self {
        self.limit_bytes = limit_bytes;
        self
    }

    pub fn with_sensitive_names(mut self, names: BTreeSet<String>) -> Self {
        self.sensitive_names = names;
        self
    }

    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    /// Sandbox a path argument. Escapes and sensitive names are refused.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let resolved = self.root.resolve_path(raw).map_err(ToolError::sandbox)?;
        let sensitive = resolved
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.sensitive_names.contains(name));
        if sensitive {
            return Err(ToolError::sandbox(format!(
                "'{raw}' names a sensitive file"
            )));
        }
        Ok(resolved)
    }

    /// Workspace-relative, `/`-separated form of a resolved path.
    pub fn relative(&self, path: &Path) -> String {
        self.root
            .relative(path)
            .unwrap_or_else(|| path.display().to_string())
    }
}

/// Deserialize schema-checked arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|err| ToolError::invalid(err.to_string()))
}

/// Tool failure from an adapter error, keeping the context chain.
pub(crate) fn failed(err: anyhow::Error) -> ToolError {
    ToolError::failed(format!("{err:#}"))
}

/// Closed object schema with the given properties.
pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Cut `text` to at most `limit` bytes on a char boundary.
pub(crate) fn truncate(mut text: String, limit: usize) -> (String, bool) {
    if text.len() <= limit {
        return (text, false);
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    (text, true)
}

type Handler = fn(&ToolContext, &Value, CallMode) -> Result<Value, ToolError>;

pub(crate) fn add(
    registry: &mut ToolRegistry,
    ctx: &Arc<ToolContext>,
    spec: ToolSpec,
    handler: Handler,
) -> Result<(), RegistryError> {
    let ctx = Arc::clone(ctx);
    registry.register(spec, move |args: &Value, mode: CallMode| {
        handler(&ctx, args, mode)
    })
}

/// Registry holding every built-in git and file tool.
pub fn builtin_registry(ctx: &Arc<ToolContext>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    git::register(&mut registry, ctx)?;
    files::register(&mut registry, ctx)?;
    Ok(registry)
}

/// Tool server with built-in tools and workspace resources.
pub fn builtin_server(ctx: ToolContext) -> Result<ToolServer> {
    let ctx = Arc::new(ctx);
    let registry = builtin_registry(&ctx)?;
    Ok(ToolServer::new(registry).with_resources(resources::WorkspaceResources::new(ctx)))
}
