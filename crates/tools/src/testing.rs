//! Shared test helpers: an in-process tool provider.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use toolweave_bridge::{BridgeError, BridgeSpec, ProviderTransport, RemoteTool, ToolProviderBridge};

/// Answers every call with `"<tool> <compact args>"`.
///
/// A tool named `reject` reports a tool-level error; one named `broken`
/// behaves like a crashed provider.
pub struct MockTransport {
    tools: Vec<String>,
}

impl MockTransport {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ProviderTransport for MockTransport {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, BridgeError> {
        Ok(self
            .tools
            .iter()
            .map(|name| RemoteTool {
                name: name.clone(),
                description: Some(format!("The {name} tool")),
                input_schema: None,
            })
            .collect())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        match name {
            "reject" => Ok(json!({
                "content": [{"type": "text", "text": "permission denied for this mailbox"}],
                "isError": true
            })),
            "broken" => Err(BridgeError::ChannelClosed),
            _ => Ok(json!({"content": [{"type": "text", "text": format!("{name} {arguments}")}]})),
        }
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }
}

pub fn mock_bridge(service: &str, transport: MockTransport) -> ToolProviderBridge {
    let spec = BridgeSpec::local("mock-provider", vec![], None)
        .with_name(service)
        .with_timeout(Duration::from_secs(5));
    match ToolProviderBridge::with_transport(spec, Box::new(transport)) {
        Ok(bridge) => bridge,
        Err(e) => panic!("mock bridge failed to start: {e}"),
    }
}
