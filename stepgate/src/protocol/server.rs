//! Tool server: decodes one request line, dispatches, encodes one response line.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::protocol::envelope::{ErrorObject, Method, Request, Response, codes, JSONRPC_VERSION};
use crate::protocol::registry::{CallMode, ToolError, ToolRegistry};

/// Entry in `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// Body of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
    #[serde(default)]
    pub truncated: bool,
}

/// Read-only artifacts exposed next to the tools.
pub trait ResourceProvider: Send + Sync {
    fn list(&self) -> Vec<ResourceDescriptor>;
    fn read(&self, uri: &str) -> Result<ResourceContents, ToolError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallParams {
    name: String,
    #[serde(default = "empty_object")]
    arguments: Value,
    mode: CallMode,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadParams {
    uri: String,
}

fn empty_object() -> Value {
    json!({})
}

pub struct ToolServer {
    registry: ToolRegistry,
    resources: Option<Box<dyn ResourceProvider>>,
}

impl ToolServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            resources: None,
        }
    }

    pub fn with_resources(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.resources = Some(Box::new(provider));
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one request line and return the response line.
    pub fn handle_line(&self, line: &str) -> String {
        let response = self.handle(line);
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(
                "{{\"jsonrpc\":\"{JSONRPC_VERSION}\",\"id\":null,\"error\":{{\"code\":{},\"message\":\"encode response: {}\"}}}}",
                codes::TOOL_FAILED,
                err.to_string().replace('"', "'")
            )
        })
    }

    fn handle(&self, line: &str) -> Response {
        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(err = %err, "unparseable request line");
                return Response::failure(
                    None,
                    ErrorObject::new(codes::PARSE_ERROR, format!("parse error: {err}")),
                );
            }
        };
        let id = raw.get("id").and_then(Value::as_u64);
        let request: Request = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(err) => {
                return Response::failure(
                    id,
                    ErrorObject::new(codes::INVALID_REQUEST, format!("invalid request: {err}")),
                );
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Response::failure(
                Some(request.id),
                ErrorObject::new(
                    codes::INVALID_REQUEST,
                    format!("unsupported jsonrpc version '{}'", request.jsonrpc),
                ),
            );
        }
        let Some(method) = Method::parse(&request.method) else {
            return Response::failure(
                Some(request.id),
                ErrorObject::new(
                    codes::METHOD_NOT_FOUND,
                    format!("method '{}' not found", request.method),
                ),
            );
        };
        debug!(id = request.id, method = method.as_str(), "dispatching request");
        match self.dispatch(method, request.params) {
            Ok(result) => Response::success(request.id, result),
            Err(err) => Response::failure(Some(request.id), err.into()),
        }
    }

    fn dispatch(&self, method: Method, params: Value) -> Result<Value, ToolError> {
        match method {
            Method::ToolsList => Ok(json!({ "tools": self.registry.list() })),
            Method::ToolsCall => {
                let params: CallParams = serde_json::from_value(params)
                    .map_err(|err| ToolError::invalid(format!("invalid tools/call params: {err}")))?;
                info!(tool = %params.name, mode = params.mode.as_str(), "tool call");
                self.registry
                    .call(&params.name, &params.arguments, params.mode)
            }
            Method::ResourcesList => {
                let resources = self
                    .resources
                    .as_ref()
                    .map(|provider| provider.list())
                    .unwrap_or_default();
                Ok(json!({ "resources": resources }))
            }
            Method::ResourcesRead => {
                let params: ReadParams = serde_json::from_value(params).map_err(|err| {
                    ToolError::invalid(format!("invalid resources/read params: {err}"))
                })?;
                let provider = self.resources.as_ref().ok_or_else(|| {
                    ToolError::not_found(format!("resource '{}' not found", params.uri))
                })?;
                let contents = provider.read(&params.uri)?;
                serde_json::to_value(contents)
                    .map_err(|err| ToolError::failed(format!("encode resource: {err}")))
            }
        }
    }

    /// Serve requests until the reader reaches end of input.
    pub fn serve<R: BufRead, W: Write>(&self, reader: R, mut writer: W) -> Result<()> {
        info!(tools = self.registry.len(), "tool server ready");
        for line in reader.lines() {
            let line = line.context("read request line")?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line);
            writer
                .write_all(response.as_bytes())
                .context("write response")?;
            writer.write_all(b"\n").context("write response")?;
            writer.flush().context("flush response")?;
        }
        info!("tool channel closed, shutting down");
        Ok(())
    }
}
