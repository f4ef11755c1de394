//! A [`Tool`] backed by a remote tool provider.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use toolweave_bridge::{BridgeError, ToolProviderBridge};
use toolweave_core::error::ToolError;
use toolweave_core::tool::{Tool, ToolDescriptor, ToolOutput};

/// One tool discovered on a bridge.
///
/// Execution hops onto the blocking pool because bridge calls park the
/// calling thread until the provider answers.
pub struct McpTool {
    descriptor: ToolDescriptor,
    bridge: Arc<ToolProviderBridge>,
}

impl McpTool {
    pub fn new(descriptor: ToolDescriptor, bridge: Arc<ToolProviderBridge>) -> Self {
        Self { descriptor, bridge }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.parameters.clone()
    }

    fn service(&self) -> &str {
        &self.descriptor.service
    }

    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "{} expects an object of arguments, got {other}",
                    self.descriptor.name
                )));
            }
        };

        let bridge = Arc::clone(&self.bridge);
        let name = self.descriptor.name.clone();
        let outcome = tokio::task::spawn_blocking(move || bridge.call(&name, arguments))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.descriptor.name.clone(),
                reason: format!("bridge call panicked: {e}"),
            })?;

        outcome.map_err(|e| to_tool_error(&self.descriptor.name, e))
    }
}

fn to_tool_error(tool_name: &str, err: BridgeError) -> ToolError {
    match err {
        BridgeError::Timeout { timeout, .. } => ToolError::Timeout {
            tool_name: tool_name.to_string(),
            timeout_secs: timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0),
        },
        BridgeError::ChannelClosed | BridgeError::Stopped(_) | BridgeError::Connect { .. } => {
            ToolError::Unavailable {
                tool_name: tool_name.to_string(),
                reason: err.to_string(),
            }
        }
        other => ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: other.to_string(),
        },
    }
}
