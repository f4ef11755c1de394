//! Aggregates tools from every configured provider and executes tool calls.
//!
//! Dispatch never fails: unknown tools, tool-level errors, timeouts and dead
//! providers all come back as unsuccessful [`ToolResult`]s carrying a hint.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use toolweave_bridge::{BridgeSpec, ServiceInfo, ToolProviderBridge};
use toolweave_config::McpServers;
use toolweave_core::error::ToolError;
use toolweave_core::provider::ToolDefinition;
use toolweave_core::tool::{Tool, ToolCall, ToolDescriptor, ToolOutput, ToolRegistry, ToolResult};
use tracing::{error, info, warn};

use crate::batch::{self, BATCH_SERVICE, BATCH_TOOL};
use crate::compress;
use crate::format::{PreCallHook, default_hooks};
use crate::hints;
use crate::mcp_tool::McpTool;

/// Service reported for names that resolve to nothing.
pub const UNKNOWN_SERVICE: &str = "unknown";

pub struct ToolDispatcher {
    registry: ToolRegistry,
    bridges: Vec<Arc<ToolProviderBridge>>,
    hooks: Vec<Box<dyn PreCallHook>>,
    batch_enabled: bool,
}

impl ToolDispatcher {
    /// An empty dispatcher with the default pre-call hooks and `batch_exec`.
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
            bridges: Vec::new(),
            hooks: default_hooks(),
            batch_enabled: true,
        }
    }

    /// Connect every enabled server, in configuration order.
    ///
    /// Blocks while providers start. A provider that fails to start is
    /// logged and left out; the rest of the session goes on without it.
    pub fn from_servers(servers: &McpServers) -> Self {
        let mut dispatcher = Self::new();

        for (name, config) in servers.iter() {
            if !config.is_enabled() {
                info!(service = name, "Tool provider disabled, skipping");
                continue;
            }

            let bridge = BridgeSpec::from_server(name, config).and_then(ToolProviderBridge::connect);
            match bridge {
                Ok(bridge) => {
                    dispatcher.add_bridge(bridge);
                }
                Err(e) => error!(service = name, error = %e, "Tool provider failed to start"),
            }
        }

        info!(
            providers = dispatcher.bridges.len(),
            tools = dispatcher.registry.len(),
            "Tool dispatcher ready"
        );
        dispatcher
    }

    /// Discover a bridge's tools and register them. Returns how many tools
    /// were registered; a bridge whose discovery fails is stopped and
    /// contributes nothing.
    pub fn add_bridge(&mut self, bridge: ToolProviderBridge) -> usize {
        let descriptors = match bridge.list_tools() {
            Ok(descriptors) => descriptors,
            Err(e) => {
                error!(service = bridge.name(), error = %e, "Tool discovery failed");
                bridge.stop();
                return 0;
            }
        };

        let bridge = Arc::new(bridge);
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(Box::new(McpTool::new(descriptor, Arc::clone(&bridge))));
        }

        info!(service = bridge.name(), tools = count, "Registered tools");
        self.bridges.push(bridge);
        count
    }

    /// Register an in-process tool. Later registrations replace earlier ones
    /// with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        let service = tool.service().to_string();
        if let Some(previous) = self.registry.register(tool) {
            warn!(
                tool = %name,
                replaced = %previous,
                by = %service,
                "Tool name collision, the later provider wins"
            );
        }
    }

    pub fn with_batch(mut self, enabled: bool) -> Self {
        self.batch_enabled = enabled;
        self
    }

    pub fn with_hook(mut self, hook: Box<dyn PreCallHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn batch_enabled(&self) -> bool {
        self.batch_enabled
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Every callable tool, including `batch_exec` when enabled.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.registry.descriptors();
        if self.batch_enabled {
            descriptors.push(batch::descriptor());
        }
        descriptors
    }

    /// Definitions sent to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors().iter().map(ToolDescriptor::to_definition).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        (self.batch_enabled && name == BATCH_TOOL) || self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.descriptors().into_iter().map(|d| d.name).collect()
    }

    pub fn service_of(&self, name: &str) -> Option<&str> {
        if self.batch_enabled && name == BATCH_TOOL {
            return Some(BATCH_SERVICE);
        }
        self.registry.service_of(name)
    }

    pub fn tool_to_service_map(&self) -> HashMap<String, String> {
        let mut map = self.registry.tool_to_service_map();
        if self.batch_enabled {
            map.insert(BATCH_TOOL.to_string(), BATCH_SERVICE.to_string());
        }
        map
    }

    /// Attribution for every connected provider.
    pub fn services(&self) -> Vec<ServiceInfo> {
        self.bridges.iter().map(|b| b.service_info()).collect()
    }

    /// Execute one tool call and record the outcome.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let service = self.service_of(&call.name).unwrap_or(UNKNOWN_SERVICE).to_string();

        let outcome = self.invoke(&call.name, call.arguments.clone()).await;
        let (success, output) = match outcome {
            Ok(ToolOutput::Error(text)) => (false, hints::with_hint(&compress::squeeze_text(&text))),
            Ok(output) if batch::envelope_failed(&output) => (false, compress::compress(&output)),
            Ok(output) => (true, compress::compress(&output)),
            Err(e) => (false, hints::with_hint(&e.to_string())),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if success {
            info!(tool = %call.name, service = %service, duration_ms, "Tool call succeeded");
        } else {
            warn!(tool = %call.name, service = %service, duration_ms, "Tool call failed");
        }

        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            service,
            success,
            output,
            timestamp: Utc::now(),
            duration_ms,
        }
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        if self.batch_enabled && name == BATCH_TOOL {
            return Ok(ToolOutput::Structured(batch::run(self, arguments).await));
        }
        self.invoke_tool(name, arguments).await
    }

    /// Run a registered tool, after its pre-call hooks. `batch_exec` is not
    /// reachable from here.
    pub(crate) async fn invoke_tool(&self, name: &str, mut arguments: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        if let Value::Object(map) = &mut arguments {
            for hook in self.hooks.iter().filter(|h| h.tool() == name) {
                hook.apply(map);
            }
        }

        tool.execute(arguments).await
    }

    /// Stop every provider. Safe to call more than once.
    pub fn shutdown(&self) {
        for bridge in &self.bridges {
            bridge.stop();
        }
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, mock_bridge};
    use async_trait::async_trait;
    use serde_json::json;
    use toolweave_config::McpServerConfig;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    /// Captures the arguments it receives.
    struct CaptureTool;

    #[async_trait]
    impl Tool for CaptureTool {
        fn name(&self) -> &str {
            "send_email"
        }
        fn description(&self) -> &str {
            "Send an email"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::Structured(arguments))
        }
    }

    #[test]
    fn later_provider_wins_collisions() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("alpha", MockTransport::new(&["status", "only_alpha"])));
        dispatcher.add_bridge(mock_bridge("beta", MockTransport::new(&["status"])));

        assert_eq!(dispatcher.service_of("status"), Some("beta"));
        assert_eq!(dispatcher.service_of("only_alpha"), Some("alpha"));
        assert_eq!(dispatcher.service_of("batch_exec"), Some("local-batch"));
        assert_eq!(dispatcher.registry().len(), 2);

        let map = dispatcher.tool_to_service_map();
        assert_eq!(map["status"], "beta");
        assert_eq!(map["batch_exec"], "local-batch");
    }

    #[tokio::test]
    async fn collision_routes_to_the_winner() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("alpha", MockTransport::new(&["status"])));
        dispatcher.add_bridge(mock_bridge("beta", MockTransport::new(&["status"])));

        let result = dispatcher.dispatch(&call("status", json!({}))).await;
        assert!(result.success);
        assert_eq!(result.service, "beta");
    }

    #[test]
    fn definitions_carry_service_prefix_and_batch() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("search", MockTransport::new(&["web_search"])));

        let defs = dispatcher.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].description, "[search] The web_search tool");
        assert_eq!(defs[1].name, "batch_exec");

        let without_batch = dispatcher.with_batch(false);
        assert_eq!(without_batch.definitions().len(), 1);
        assert!(!without_batch.contains("batch_exec"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let dispatcher = ToolDispatcher::new();
        let result = dispatcher.dispatch(&call("nope", json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.service, UNKNOWN_SERVICE);
        assert!(result.output.contains("Tool not found: nope"));
        assert!(result.output.contains("Hint:"));
    }

    #[tokio::test]
    async fn tool_level_error_gets_permission_hint() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("mail", MockTransport::new(&["reject"])));

        let result = dispatcher.dispatch(&call("reject", json!({}))).await;
        assert!(!result.success);
        assert!(result.output.starts_with("permission denied for this mailbox\nHint:"));
        assert!(result.output.contains("permitted"));
    }

    #[tokio::test]
    async fn dead_provider_is_a_failed_result() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("mail", MockTransport::new(&["broken"])));

        let result = dispatcher.dispatch(&call("broken", json!({}))).await;
        assert!(!result.success);
        assert!(result.output.contains("unavailable"));
    }

    #[tokio::test]
    async fn send_email_body_is_converted_before_execution() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Box::new(CaptureTool));

        let result = dispatcher
            .dispatch(&call("send_email", json!({"to": "bob@example.com", "body": "Hello\n\nBye"})))
            .await;
        assert!(result.success);
        assert_eq!(result.service, "local");
        let echoed: Value = serde_json::from_str(&result.output).unwrap();
        assert!(echoed["body"].as_str().unwrap().contains("<p>Hello</p>"));
    }

    #[tokio::test]
    async fn batch_through_dispatch() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("mail", MockTransport::new(&["get_email"])));

        let ok = dispatcher
            .dispatch(&call("batch_exec", json!({"tool": "get_email", "args_list": [{"id": 1}]})))
            .await;
        assert!(ok.success);
        assert_eq!(ok.service, "local-batch");
        assert!(ok.output.starts_with(r#"{"success":true,"results":[{"index":0"#));

        let unknown = dispatcher
            .dispatch(&call("batch_exec", json!({"tool": "missing", "args_list": []})))
            .await;
        assert!(!unknown.success);
        assert_eq!(unknown.output, r#"{"success":false,"error":"unknown tool 'missing'"}"#);
    }

    #[test]
    fn disabled_and_broken_servers_are_skipped() {
        let mut servers = McpServers::new();
        let mut off = McpServerConfig::stdio("/nonexistent/off", vec![]);
        off.disabled = true;
        servers.insert("off", off);
        let mut broken = McpServerConfig::stdio("/nonexistent/toolweave-provider", vec![]);
        broken.timeout_secs = 2;
        servers.insert("broken", broken);

        let dispatcher = ToolDispatcher::from_servers(&servers);
        assert!(dispatcher.is_empty());
        assert!(dispatcher.services().is_empty());
        assert_eq!(dispatcher.tool_names(), ["batch_exec"]);
    }

    #[test]
    fn shutdown_is_repeatable() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.add_bridge(mock_bridge("mail", MockTransport::new(&["status"])));
        dispatcher.shutdown();
        dispatcher.shutdown();
        assert_eq!(dispatcher.services()[0].tool_names, ["status"]);
    }
}
