//! Shared test helpers: scripted providers and an in-process tool.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use toolweave_core::error::{ProviderError, ToolError};
use toolweave_core::message::{Message, MessageToolCall};
use toolweave_core::provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
use toolweave_core::tool::{Tool, ToolOutput};

/// Returns queued results in order and remembers every request it saw.
///
/// Panics when called more often than it was scripted for.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let call = requests.len();
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no response scripted for call #{call}"))
    }
}

/// Always fails with a network error.
pub struct UnreachableProvider;

#[async_trait]
impl Provider for UnreachableProvider {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A final answer with finish reason `stop`.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        finish_reason: Some(FinishReason::Stop),
        usage: usage(),
        model: "scripted-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A response requesting tools, with finish reason `tool_calls`.
pub fn tool_call_response(calls: Vec<MessageToolCall>, text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls(text, calls),
        finish_reason: Some(FinishReason::ToolCalls),
        usage: usage(),
        model: "scripted-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Local tool that echoes its arguments back as structured output.
///
/// `fail` makes it report a tool-level error instead.
pub struct EchoTool {
    pub name: &'static str,
    pub fail: bool,
}

impl EchoTool {
    pub fn new(name: &'static str) -> Self {
        Self { name, fail: false }
    }

    pub fn failing(name: &'static str) -> Self {
        Self { name, fail: true }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Echo the arguments"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn service(&self) -> &str {
        "echo"
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        if self.fail {
            return Ok(ToolOutput::Error("invalid parameter: query".into()));
        }
        Ok(ToolOutput::Structured(json!({"echo": arguments})))
    }
}
