//! JSON-RPC 2.0 framing shared by the transports.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::BridgeError;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> Notification<'a> {
    pub fn new(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Anything the provider may send back on the channel.
#[derive(Debug, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Incoming {
    /// Whether this is the response to request `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.method.is_none()
            && match &self.id {
                Some(Value::Number(n)) => n.as_u64() == Some(id),
                Some(Value::String(s)) => s.parse::<u64>().ok() == Some(id),
                _ => false,
            }
    }

    /// The response owed for a request the provider sent us, if this is one.
    ///
    /// `ping` gets an empty result; anything else is refused as unknown.
    pub fn server_reply(&self) -> Option<Value> {
        let (id, method) = (self.id.as_ref()?, self.method.as_deref()?);
        Some(match method {
            "ping" => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": METHOD_NOT_FOUND, "message": format!("method not supported: {other}")},
            }),
        })
    }

    pub fn into_result(self) -> Result<Value, BridgeError> {
        if let Some(error) = self.error {
            let mut message = error.message;
            if let Some(data) = error.data {
                message = format!("{message}: {data}");
            }
            return Err(BridgeError::Rpc {
                code: error.code,
                message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolweave",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let line = serde_json::to_string(&Request::new(7, "tools/list", None)).unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#);
    }

    #[test]
    fn matches_numeric_and_string_ids() {
        let numeric: Incoming = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        let string: Incoming = serde_json::from_str(r#"{"jsonrpc":"2.0","id":"3","result":{}}"#).unwrap();
        assert!(numeric.answers(3));
        assert!(string.answers(3));
        assert!(!numeric.answers(4));
    }

    #[test]
    fn server_requests_are_not_answers() {
        let ping: Incoming =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).unwrap();
        assert!(!ping.answers(3));
    }

    #[test]
    fn ping_gets_an_empty_result() {
        let ping: Incoming =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#).unwrap();
        assert_eq!(
            ping.server_reply(),
            Some(json!({"jsonrpc": "2.0", "id": "srv-1", "result": {}}))
        );
    }

    #[test]
    fn other_server_requests_are_refused() {
        let sampling: Incoming =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":9,"method":"sampling/createMessage"}"#).unwrap();
        let reply = sampling.server_reply().unwrap();
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[test]
    fn notifications_and_responses_need_no_reply() {
        let notification: Incoming =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).unwrap();
        let response: Incoming = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(notification.server_reply().is_none());
        assert!(response.server_reply().is_none());
    }

    #[test]
    fn error_object_becomes_rpc_error() {
        let incoming: Incoming = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad params"}}"#,
        )
        .unwrap();
        match incoming.into_result() {
            Err(BridgeError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "bad params");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }
}
