//! Wire envelopes: one JSON object per line, JSON-RPC 2.0 shaped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Stable error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_ARGUMENTS: i64 = -32602;
    pub const TOOL_FAILED: i64 = -32000;
    pub const UNKNOWN_TOOL: i64 = -32001;
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
    pub const SANDBOX_VIOLATION: i64 = -32003;
    pub const PREVIEW_UNSUPPORTED: i64 = -32004;
}

/// Transport-class codes mean the exchange itself is broken.
pub fn is_transport_code(code: i64) -> bool {
    matches!(
        code,
        codes::PARSE_ERROR | codes::INVALID_REQUEST | codes::METHOD_NOT_FOUND
    )
}

/// The fixed method set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::ToolsList => "tools/list",
            Method::ToolsCall => "tools/call",
            Method::ResourcesList => "resources/list",
            Method::ResourcesRead => "resources/read",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tools/list" => Some(Method::ToolsList),
            "tools/call" => Some(Method::ToolsCall),
            "resources/list" => Some(Method::ResourcesList),
            "resources/read" => Some(Method::ResourcesRead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: Method, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.as_str().to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Response envelope. `id` is `None` only when the request id was unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Exactly one of `result` / `error` must be present.
    pub fn into_outcome(self) -> Result<Result<Value, ErrorObject>, String> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(format!("unsupported jsonrpc version '{}'", self.jsonrpc));
        }
        match (self.result, self.error) {
            (Some(result), None) => Ok(Ok(result)),
            (None, Some(error)) => Ok(Err(error)),
            (Some(_), Some(_)) => Err("response carries both result and error".to_string()),
            (None, None) => Err("response carries neither result nor error".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_method_name() {
        let req = Request::new(7, Method::ToolsCall, json!({"name": "status"}));
        let value = serde_json::to_value(&req).expect("serialize");
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "status"}})
        );
    }

    #[test]
    fn success_response_omits_error() {
        let line = serde_json::to_string(&Response::success(1, json!({"ok": true}))).expect("json");
        assert!(!line.contains("error"));
    }

    #[test]
    fn response_with_both_fields_is_malformed() {
        let resp = Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(1),
            result: Some(json!(1)),
            error: Some(ErrorObject::new(codes::TOOL_FAILED, "x")),
        };
        assert!(resp.into_outcome().is_err());
    }

    #[test]
    fn transport_codes_are_classified() {
        assert!(is_transport_code(codes::PARSE_ERROR));
        assert!(is_transport_code(codes::METHOD_NOT_FOUND));
        assert!(!is_transport_code(codes::INVALID_ARGUMENTS));
        assert!(!is_transport_code(codes::SANDBOX_VIOLATION));
    }

    #[test]
    fn methods_parse_from_wire_names() {
        for method in [
            Method::ToolsList,
            Method::ToolsCall,
            Method::ResourcesList,
            Method::ResourcesRead,
        ] {
            assert_eq!(Method::parse(method.as_str()), Some(method));
        }
        assert_eq!(Method::parse("tools/delete"), None);
    }
}
