//! JSON-RPC-like envelope carried inside WebSocket Text frames, and the
//! method dispatch table (C8). Mirrors the command registry pattern the
//! teacher uses for IRC handlers: a `HashMap` from a string key to a plain
//! function rather than a trait-object hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing or non-numeric _reqid")]
    MissingReqId,
    #[error("missing or non-string _method")]
    MissingMethod,
}

#[derive(Debug, Clone)]
pub struct SudaGureumRequest {
    pub id: u32,
    pub method: String,
    pub params: Map<String, Value>,
}

impl SudaGureumRequest {
    /// Case-insensitive lookup, matching the spec's `case-insensitive
    /// map<string,string>` params description.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut obj) = value else {
            return Err(RpcError::NotAnObject);
        };
        let id = obj
            .remove("_reqid")
            .and_then(|v| v.as_u64())
            .ok_or(RpcError::MissingReqId)? as u32;
        let method = obj
            .remove("_method")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or(RpcError::MissingMethod)?;
        Ok(Self { id, method, params: obj })
    }
}

#[derive(Debug, Clone)]
pub struct SudaGureumResponse {
    pub id: u32,
    pub success: bool,
    pub body: Map<String, Value>,
}

impl SudaGureumResponse {
    pub fn ok(id: u32) -> Self {
        Self { id, success: true, body: Map::new() }
    }

    pub fn error(id: u32, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(message.into()));
        Self { id, success: false, body }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn encode(&self) -> String {
        let mut obj = self.body.clone();
        obj.insert("_reqid".to_string(), Value::from(self.id));
        obj.insert("success".to_string(), Value::from(self.success));
        serde_json::to_string(&Value::Object(obj)).unwrap_or_else(|_| "{}".to_string())
    }
}

pub type MethodHandler = Arc<dyn Fn(&SudaGureumRequest) -> SudaGureumResponse + Send + Sync>;

/// Explicit string→handler map, per the design notes' redesign of the RPC
/// method table away from any virtual-dispatch hierarchy.
#[derive(Clone)]
pub struct MethodTable {
    methods: HashMap<&'static str, MethodHandler>,
}

impl MethodTable {
    pub fn new() -> Self {
        let mut methods: HashMap<&'static str, MethodHandler> = HashMap::new();
        methods.insert("heartbeat", Arc::new(handle_heartbeat));
        Self { methods }
    }

    pub fn register(&mut self, method: &'static str, handler: MethodHandler) {
        self.methods.insert(method, handler);
    }

    pub fn dispatch(&self, request: &SudaGureumRequest) -> SudaGureumResponse {
        match self.methods.get(request.method.as_str()) {
            Some(handler) => handler(request),
            None => SudaGureumResponse::error(request.id, format!("unknown method: {}", request.method)),
        }
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_heartbeat(request: &SudaGureumRequest) -> SudaGureumResponse {
    if request.param("seenEids").is_none() {
        return SudaGureumResponse::error(request.id, "missing seenEids");
    }
    SudaGureumResponse::ok(request.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reqid_and_method() {
        let req = SudaGureumRequest::parse(r#"{"_reqid":7,"_method":"heartbeat","seenEids":"{}"}"#).unwrap();
        assert_eq!(req.id, 7);
        assert_eq!(req.method, "heartbeat");
    }

    #[test]
    fn heartbeat_round_trip_succeeds() {
        let table = MethodTable::new();
        let req = SudaGureumRequest::parse(r#"{"_reqid":7,"_method":"heartbeat","seenEids":"{}"}"#).unwrap();
        let resp = table.dispatch(&req);
        assert!(resp.success);
        let encoded = resp.encode();
        assert!(encoded.contains("\"_reqid\":7"));
        assert!(encoded.contains("\"success\":true"));
    }

    #[test]
    fn unknown_method_reports_failure_without_closing() {
        let table = MethodTable::new();
        let req = SudaGureumRequest::parse(r#"{"_reqid":1,"_method":"bogus"}"#).unwrap();
        let resp = table.dispatch(&req);
        assert!(!resp.success);
    }
}
