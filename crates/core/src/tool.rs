//! Tool trait, tool outputs and the tool registry.
//!
//! Tools come from remote tool providers (one service per provider) or are
//! synthesized locally. They are registered in a [`ToolRegistry`] that the
//! dispatcher consults by name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Service name used for tools that are not backed by a remote provider.
pub const LOCAL_SERVICE: &str = "local";

/// A request to execute a tool, with its arguments already recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// What a tool handed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    /// A structured payload.
    Structured(serde_json::Value),
    /// Plain text content.
    Text(String),
    /// The provider reported a tool-level failure.
    Error(String),
    /// Nothing usable came back.
    Empty,
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Flatten into a JSON value (text and error become strings, empty becomes null).
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::Structured(value) => value,
            Self::Text(text) | Self::Error(text) => serde_json::Value::String(text),
            Self::Empty => serde_json::Value::Null,
        }
    }
}

/// The recorded outcome of one tool request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Name of the tool that ran
    pub tool_name: String,

    /// Service that owns the tool
    pub service: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Compressed output, or error text with a hint
    pub output: String,

    /// When execution finished
    pub timestamp: DateTime<Utc>,

    /// Wall-clock execution time
    pub duration_ms: u64,
}

/// Schema metadata for one tool, as advertised by its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub service: String,
}

impl ToolDescriptor {
    /// The definition sent to the model, with the owning service as a prefix.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: format!("[{}] {}", self.service, self.description),
            parameters: self.parameters.clone(),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search", "send_email").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// The service that owns this tool.
    fn service(&self) -> &str {
        LOCAL_SERVICE
    }

    /// Execute the tool with the given arguments.
    ///
    /// Provider-reported failures come back as `Ok(ToolOutput::Error)`; `Err`
    /// is reserved for failures to reach the tool at all.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolOutput, ToolError>;

    /// Describe this tool.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            service: self.service().to_string(),
        }
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        self.descriptor().to_definition()
    }
}

/// A registry of available tools, in registration order.
///
/// Registering a name twice replaces the earlier tool in place; the last
/// registration wins.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Returns the service of the tool it replaced, if any.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Option<String> {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => {
                let previous = std::mem::replace(&mut self.tools[slot], tool);
                Some(previous.service().to_string())
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
                None
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Get all tool descriptors.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolOutput, ToolError> {
        let tool = self.get(&call.name).ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone()).await
    }

    /// Service owning the named tool.
    pub fn service_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|t| t.service())
    }

    /// Tool name → owning service name.
    pub fn tool_to_service_map(&self) -> HashMap<String, String> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.service().to_string()))
            .collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
