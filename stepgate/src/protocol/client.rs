//! Blocking tool client: one request in flight, responses matched by id.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::error::{CallError, ProtocolError, ToolExecutionError};
use crate::protocol::envelope::{Method, Request, Response, is_transport_code};
use crate::protocol::registry::{CallMode, ToolSpec};
use crate::protocol::server::{ResourceContents, ResourceDescriptor};
use crate::protocol::transport::{Recv, Transport};

#[derive(Debug, Deserialize)]
struct ToolList {
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    resources: Vec<ResourceDescriptor>,
}

/// Client side of the tool protocol.
///
/// Calls take `&mut self`, so a client can never have two requests
/// outstanding. After any [`ProtocolError`] the client is poisoned and every
/// later call fails with [`ProtocolError::ChannelClosed`].
pub struct ToolClient<T: Transport> {
    transport: T,
    next_id: u64,
    timeout: Duration,
    poisoned: bool,
}

impl<T: Transport> ToolClient<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            next_id: 1,
            timeout,
            poisoned: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn list_tools(&mut self) -> Result<Vec<ToolSpec>, CallError> {
        let result = self.request(Method::ToolsList, json!({}), "tools/list")?;
        let list: ToolList = decode(result, Method::ToolsList).map_err(|err| self.poison(err))?;
        Ok(list.tools)
    }

    pub fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        mode: CallMode,
    ) -> Result<Value, CallError> {
        let params = json!({"name": name, "arguments": arguments, "mode": mode});
        self.request(Method::ToolsCall, params, name)
    }

    pub fn list_resources(&mut self) -> Result<Vec<ResourceDescriptor>, CallError> {
        let result = self.request(Method::ResourcesList, json!({}), "resources/list")?;
        let list: ResourceList =
            decode(result, Method::ResourcesList).map_err(|err| self.poison(err))?;
        Ok(list.resources)
    }

    pub fn read_resource(&mut self, uri: &str) -> Result<ResourceContents, CallError> {
        let result = self.request(Method::ResourcesRead, json!({"uri": uri}), uri)?;
        decode(result, Method::ResourcesRead).map_err(|err| self.poison(err).into())
    }

    /// Send one request and block until its response, a timeout, or a fault.
    ///
    /// `subject` names the tool (or resource) for tool-level errors.
    #[instrument(skip(self, params, method), fields(method = method.as_str(), id = self.next_id))]
    fn request(&mut self, method: Method, params: Value, subject: &str) -> Result<Value, CallError> {
        if self.poisoned {
            return Err(ProtocolError::ChannelClosed.into());
        }
        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::to_string(&Request::new(id, method, params)).map_err(|err| {
            self.poison(ProtocolError::Malformed {
                detail: format!("encode request: {err}"),
            })
        })?;
        self.transport.send(&line).map_err(|err| self.poison(err))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let recv = self
                .transport
                .recv(remaining)
                .map_err(|err| self.poison(err))?;
            let line = match recv {
                Recv::Line(line) => line,
                Recv::TimedOut => {
                    warn!(
                        timeout_ms = self.timeout.as_millis() as u64,
                        "tool call timed out"
                    );
                    return Err(self
                        .poison(ProtocolError::Timeout {
                            method: method.as_str().to_string(),
                            after_ms: self.timeout.as_millis() as u64,
                        })
                        .into());
                }
                Recv::Closed => return Err(self.poison(ProtocolError::ChannelClosed).into()),
            };
            if line.trim().is_empty() {
                continue;
            }
            let response: Response = serde_json::from_str(&line).map_err(|err| {
                self.poison(ProtocolError::Malformed {
                    detail: format!("undecodable response: {err}"),
                })
            })?;
            match response.id {
                Some(got) if got < id => {
                    warn!(expected = id, got, "skipping stale response");
                    continue;
                }
                Some(got) if got > id => {
                    return Err(self
                        .poison(ProtocolError::Malformed {
                            detail: format!("response id {got} is ahead of request id {id}"),
                        })
                        .into());
                }
                _ => {}
            }
            let outcome = response.into_outcome().map_err(|detail| {
                self.poison(ProtocolError::Malformed { detail })
            })?;
            return match outcome {
                Ok(result) => {
                    debug!("response received");
                    Ok(result)
                }
                Err(error) if is_transport_code(error.code) => Err(self
                    .poison(ProtocolError::Rejected {
                        method: method.as_str().to_string(),
                        code: error.code,
                        message: error.message,
                    })
                    .into()),
                Err(error) => Err(ToolExecutionError {
                    tool: subject.to_string(),
                    code: error.code,
                    message: error.message,
                }
                .into()),
            };
        }
    }

    fn poison(&mut self, err: ProtocolError) -> ProtocolError {
        warn!(err = %err, "tool channel poisoned");
        self.poisoned = true;
        err
    }
}

fn decode<D: for<'de> Deserialize<'de>>(value: Value, method: Method) -> Result<D, ProtocolError> {
    serde_json::from_value(value).map_err(|err| ProtocolError::Malformed {
        detail: format!("unexpected {} result: {err}", method.as_str()),
    })
}
