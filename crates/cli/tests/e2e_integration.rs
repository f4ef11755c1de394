//! End-to-end integration tests for toolweave.
//!
//! These tests run the full pipeline from a user message to the final
//! answer: scripted model responses, tool providers behind real bridges
//! (with in-process transports), dispatch, compression, history and the
//! tool call log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolweave_agent::{AgentSession, ControllerOptions, RoundController, Termination, ToolCallLog};
use toolweave_bridge::{BridgeError, BridgeSpec, ProviderTransport, RemoteTool, ToolProviderBridge};
use toolweave_config::AppConfig;
use toolweave_core::error::ProviderError;
use toolweave_core::event::{DomainEvent, EventBus};
use toolweave_core::message::{Conversation, Message, MessageToolCall, Role};
use toolweave_core::provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
use toolweave_core::tool::ToolCall;
use toolweave_tools::ToolDispatcher;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock model that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if requests.len() >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                requests.len(),
                responses.len()
            );
        }
        let response = responses[requests.len()].clone();
        requests.push(request);
        Ok(response)
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn stop_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        finish_reason: Some(FinishReason::Stop),
        usage: usage(),
        model: "mock".into(),
        metadata: serde_json::Map::new(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls("", tool_calls),
        finish_reason: Some(FinishReason::ToolCalls),
        usage: usage(),
        model: "mock".into(),
        metadata: serde_json::Map::new(),
    }
}

// ── Mock tool providers ──────────────────────────────────────────────────

/// An in-process tool provider. Every call returns `reply` with the
/// arguments appended, wrapped the way providers wrap text content.
struct FakeProvider {
    tools: Vec<&'static str>,
    reply: &'static str,
    seen: Arc<Mutex<Vec<(String, Value)>>>,
}

#[async_trait]
impl ProviderTransport for FakeProvider {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, BridgeError> {
        Ok(self
            .tools
            .iter()
            .map(|name| RemoteTool {
                name: name.to_string(),
                description: Some(format!("{name} from {}", self.reply)),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}}
                })),
            })
            .collect())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        self.seen.lock().unwrap().push((name.to_string(), arguments.clone()));
        Ok(json!({
            "content": [{"type": "text", "text": format!("{}:   {}\n\n\n\nend", self.reply, arguments)}]
        }))
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }
}

fn bridge(service: &str, tools: Vec<&'static str>, reply: &'static str) -> (ToolProviderBridge, Arc<Mutex<Vec<(String, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let spec = BridgeSpec::local("fake-provider", Vec::new(), None)
        .with_name(service)
        .with_timeout(Duration::from_secs(5));
    let transport = FakeProvider {
        tools,
        reply,
        seen: Arc::clone(&seen),
    };
    let bridge = ToolProviderBridge::with_transport(spec, Box::new(transport)).expect("bridge starts");
    (bridge, seen)
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn e2e_web_search_then_answer() {
    let (search, seen) = bridge("search", vec!["web_search"], "results");
    let mut dispatcher = ToolDispatcher::new();
    dispatcher.add_bridge(search);
    let dispatcher = Arc::new(dispatcher);

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![MessageToolCall::new("call_1", "web_search", r#"{"query": "X"}"#)]),
        stop_response("X is a letter."),
    ]));
    let controller = RoundController::new(provider.clone(), Arc::clone(&dispatcher), ControllerOptions::default());

    let mut conversation = Conversation::with_system("You are helpful.");
    conversation.push(Message::user("search for X"));
    let mut log = ToolCallLog::new();

    let outcome = controller.run(&mut conversation, &mut log).await.unwrap();

    assert_eq!(outcome.answer, "X is a letter.");
    assert_eq!(outcome.termination, Termination::StoppedByModel);
    assert_eq!(provider.calls(), 2);

    // The provider saw the recovered arguments.
    assert_eq!(seen.lock().unwrap().as_slice(), [("web_search".to_string(), json!({"query": "X"}))]);

    // Exactly one log entry, attributed to the right service.
    assert_eq!(log.len(), 1);
    let record = &log.records()[0];
    assert_eq!(record.tool_name, "web_search");
    assert_eq!(record.service, "search");
    assert!(record.success);

    // system, user, assistant(request), tool result, assistant(answer)
    let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    let result_turn = &conversation.messages[3];
    assert_eq!(result_turn.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(result_turn.content, "results: {\"query\":\"X\"}\n\nend");
    conversation.validate().unwrap();

    // The model saw service-prefixed descriptions and the batch tool.
    let advertised = provider.request(0).tools;
    assert!(advertised.iter().any(|t| t.name == "web_search" && t.description.starts_with("[search] ")));
    assert!(advertised.iter().any(|t| t.name == "batch_exec"));

    dispatcher.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_later_provider_wins_name_collision() {
    let (first, first_seen) = bridge("ops-a", vec!["status", "uptime"], "from-a");
    let (second, second_seen) = bridge("ops-b", vec!["status"], "from-b");

    let mut dispatcher = ToolDispatcher::new();
    dispatcher.add_bridge(first);
    dispatcher.add_bridge(second);

    assert_eq!(dispatcher.tool_to_service_map()["status"], "ops-b");
    assert_eq!(dispatcher.tool_to_service_map()["uptime"], "ops-a");
    let status: Vec<_> = dispatcher.descriptors().into_iter().filter(|d| d.name == "status").collect();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].service, "ops-b");

    let result = dispatcher
        .dispatch(&ToolCall {
            id: "c".into(),
            name: "status".into(),
            arguments: json!({}),
        })
        .await;
    assert!(result.success);
    assert_eq!(result.service, "ops-b");
    assert!(result.output.starts_with("from-b"));
    assert!(first_seen.lock().unwrap().is_empty());
    assert_eq!(second_seen.lock().unwrap().len(), 1);

    dispatcher.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_batch_through_the_model() {
    let (mail, seen) = bridge("mail", vec!["get_email"], "mail");
    let mut dispatcher = ToolDispatcher::new();
    dispatcher.add_bridge(mail);
    let dispatcher = Arc::new(dispatcher);

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![MessageToolCall::new(
            "b1",
            "batch_exec",
            r#"{"tool": "get_email", "args_list": [{"id": 1}, {"id": 2}, {"id": 3}]}"#,
        )]),
        stop_response("Read three emails."),
    ]));
    let controller = RoundController::new(provider, Arc::clone(&dispatcher), ControllerOptions::default());

    let mut conversation = Conversation::with_system("sys");
    conversation.push(Message::user("read my mail"));
    let mut log = ToolCallLog::new();
    controller.run(&mut conversation, &mut log).await.unwrap();

    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(log.len(), 1);
    assert_eq!(log.records()[0].service, "local-batch");

    let envelope: Value = serde_json::from_str(&conversation.messages[3].content).unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["results"].as_array().unwrap().len(), 3);

    dispatcher.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_session_summary_and_events() {
    let (mail, _) = bridge("mail", vec!["list_inbox"], "inbox");
    let mut dispatcher = ToolDispatcher::new();
    dispatcher.add_bridge(mail);
    let dispatcher = Arc::new(dispatcher);

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![MessageToolCall::new("a", "list_inbox", "{}")]),
        stop_response("Two unread messages."),
    ]));
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();

    let mut session = AgentSession::new(provider, Arc::clone(&dispatcher), &AppConfig::default())
        .with_event_bus(Arc::clone(&event_bus));
    let reply = session.process_message("anything new?", None).await.unwrap();

    assert_eq!(reply.answer, "Two unread messages.");
    assert!(reply.text.contains("  - [mail] list_inbox"));
    assert!(reply.text.ends_with("Overall: 1/1 succeeded (100.0%)"));

    let mut tools_seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::ToolExecuted { tool_name, service, success, .. } = event.as_ref() {
            tools_seen.push((tool_name.clone(), service.clone(), *success));
        }
    }
    assert_eq!(tools_seen, [("list_inbox".to_string(), "mail".to_string(), true)]);

    dispatcher.shutdown();
    dispatcher.shutdown();
}

#[tokio::test]
async fn e2e_config_from_desktop_json_layout() {
    let raw = r#"{
        "mcpServers": {
            "files": {"command": "npx", "args": ["-y", "server-files"], "workingDirectory": "/srv"},
            "old": {"command": "legacy", "disabled": true}
        },
        "model": {"name": "qwen-plus", "base_url": "http://localhost:11434/v1"}
    }"#;
    let config = AppConfig::from_json_str(raw).unwrap();

    assert_eq!(config.model.name, "qwen-plus");
    assert_eq!(config.mcp_servers.len(), 2);
    assert_eq!(config.mcp_servers.enabled().count(), 1);
    assert_eq!(toolweave_providers::provider_label(&config.model.base_url), "local");

    let files = config.mcp_servers.get("files").unwrap();
    let spec = BridgeSpec::from_server("files", files).unwrap();
    assert_eq!(spec.command(), "npx");
    assert_eq!(spec.working_directory().cloned(), Some(std::path::PathBuf::from("/srv")));
}
