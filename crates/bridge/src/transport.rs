//! The seam between a bridge worker and the wire.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BridgeError;
use crate::http::HttpTransport;
use crate::spec::{BridgeSpec, TransportSpec};
use crate::stdio::StdioTransport;

/// A tool as the provider advertises it, before normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// One connection to a tool provider.
///
/// Methods take `&mut self` because a transport is owned by exactly one
/// worker, which serializes every request.
#[async_trait]
pub trait ProviderTransport: Send {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, BridgeError>;

    /// Returns the raw `tools/call` result object.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, BridgeError>;

    async fn close(&mut self) -> Result<(), BridgeError>;
}

/// Open the transport named by `spec` and complete the handshake.
pub async fn connect(spec: &BridgeSpec) -> Result<Box<dyn ProviderTransport>, BridgeError> {
    match &spec.transport {
        TransportSpec::Stdio { .. } => Ok(Box::new(StdioTransport::connect(spec).await?)),
        TransportSpec::Http { .. } => Ok(Box::new(HttpTransport::connect(spec).await?)),
    }
}

/// Walk a paged `tools/list` result.
pub(crate) fn parse_tools_page(result: Value) -> Result<(Vec<RemoteTool>, Option<String>), BridgeError> {
    #[derive(Deserialize)]
    struct Page {
        #[serde(default)]
        tools: Vec<RemoteTool>,
        #[serde(default, rename = "nextCursor")]
        next_cursor: Option<String>,
    }

    let page: Page = serde_json::from_value(result)
        .map_err(|e| BridgeError::protocol(format!("malformed tools/list result: {e}")))?;
    Ok((page.tools, page.next_cursor.filter(|c| !c.is_empty())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tools_page_with_cursor() {
        let (tools, cursor) = parse_tools_page(json!({
            "tools": [
                {"name": "send_email", "description": "Send", "inputSchema": {"type": "object"}},
                {"name": "status"}
            ],
            "nextCursor": "page-2"
        }))
        .unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1].description, None);
        assert_eq!(tools[1].input_schema, None);
        assert_eq!(cursor.as_deref(), Some("page-2"));
    }

    #[test]
    fn empty_cursor_ends_paging() {
        let (_, cursor) = parse_tools_page(json!({"tools": [], "nextCursor": ""})).unwrap();
        assert!(cursor.is_none());
    }

    #[test]
    fn malformed_page_is_protocol_error() {
        assert!(matches!(
            parse_tools_page(json!({"tools": "nope"})),
            Err(BridgeError::Protocol(_))
        ));
    }
}
