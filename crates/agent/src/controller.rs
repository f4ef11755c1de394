//! The round controller: alternate model calls and tool execution until the
//! model stops, the round limit is reached, or the provider keeps failing.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use toolweave_config::{AppConfig, ModelConfig};
use toolweave_core::event::{DomainEvent, EventBus};
use toolweave_core::message::{Conversation, Message, MessageToolCall, Role, ToolArguments};
use toolweave_core::payload::recover_payload;
use toolweave_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use toolweave_core::tool::ToolCall;
use toolweave_tools::ToolDispatcher;
use tracing::{debug, info, warn};

use crate::call_log::{ToolCallLog, ToolCallRecord};
use crate::text_calls::parse_text_calls;

/// Answer used when the round limit is hit before any assistant text.
pub const ROUND_LIMIT_MARKER: &str = "[round limit exceeded]";

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Model calls allowed per [`RoundController::run`]
    pub max_rounds: u32,
    /// Requests executed per assistant turn; the rest are dropped
    pub max_tool_calls_per_message: usize,
    /// Look for text-form tool requests when the model sends none and has
    /// not finished with `stop`
    pub text_call_fallback: bool,
    /// Failed model calls in a row before the run ends `Degraded`.
    ///
    /// A single failure only records the fallback message and moves on to
    /// the next round check. The cap keeps an unreachable endpoint from
    /// spending every remaining round; set it to `max_rounds` to retry until
    /// the round limit instead.
    pub max_consecutive_failures: u32,
}

impl ControllerOptions {
    /// Options for unattended runs, bounded by `[client] max_rounds`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_rounds: config.client.max_rounds,
            max_tool_calls_per_message: config.agent.max_tool_calls_per_message,
            text_call_fallback: config.agent.text_call_fallback,
            max_consecutive_failures: config.agent.max_consecutive_failures,
            ..Self::for_model(&config.model)
        }
    }

    pub fn for_model(model: &ModelConfig) -> Self {
        Self {
            model: model.name.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            ..Self::default()
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            model: ModelConfig::default().name,
            temperature: 0.7,
            max_tokens: None,
            max_rounds: 1000,
            max_tool_calls_per_message: 3,
            text_call_fallback: false,
            max_consecutive_failures: 3,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without requesting tools
    StoppedByModel,
    /// Every allowed round was used
    RoundLimitExhausted,
    /// The provider failed too many times in a row
    Degraded,
}

#[derive(Debug, Clone)]
enum RoundState {
    AwaitModel,
    HaveToolRequests(Vec<MessageToolCall>),
    Terminal(Termination),
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub answer: String,
    pub termination: Termination,
    /// Model calls made, failed ones included
    pub rounds: u32,
    /// Tool executions, in order
    pub tool_results: usize,
}

/// Drives one conversation. Create one per conversation; the provider and
/// dispatcher may be shared.
pub struct RoundController {
    provider: Arc<dyn Provider>,
    dispatcher: Arc<ToolDispatcher>,
    options: ControllerOptions,
    event_bus: Arc<EventBus>,
}

impl RoundController {
    pub fn new(provider: Arc<dyn Provider>, dispatcher: Arc<ToolDispatcher>, options: ControllerOptions) -> Self {
        Self {
            provider,
            dispatcher,
            options,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Publish progress on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.options.max_rounds = max_rounds;
        self
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Run rounds until a terminal state.
    ///
    /// The transcript is checked after every round; a violation is the only
    /// error. Provider failures are absorbed and reported through the outcome.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        log: &mut ToolCallLog,
    ) -> toolweave_core::Result<RunOutcome> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            max_rounds = self.options.max_rounds,
            "Processing conversation"
        );

        let definitions = self.dispatcher.definitions();
        let first_new = conversation.messages.len();
        let mut state = RoundState::AwaitModel;
        let mut rounds = 0u32;
        let mut failures = 0u32;
        let mut tool_results = 0usize;
        let mut fallback: Option<String> = None;

        let termination = loop {
            state = match state {
                RoundState::AwaitModel if rounds >= self.options.max_rounds => {
                    warn!(
                        conversation_id = %conversation.id,
                        rounds,
                        "Round limit reached"
                    );
                    RoundState::Terminal(Termination::RoundLimitExhausted)
                }
                RoundState::AwaitModel => {
                    rounds += 1;
                    debug!(conversation_id = %conversation.id, round = rounds, "Round started");
                    self.event_bus.publish(DomainEvent::RoundStarted {
                        conversation_id: conversation.id.to_string(),
                        round: rounds,
                        timestamp: Utc::now(),
                    });

                    match self.provider.complete(self.request(conversation, &definitions)).await {
                        Ok(response) => {
                            failures = 0;
                            fallback = None;
                            self.absorb(conversation, response)
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(round = rounds, failures, error = %e, "Model call failed");
                            self.event_bus.publish(DomainEvent::ErrorOccurred {
                                context: format!("model call in round {rounds}"),
                                error_message: e.to_string(),
                                timestamp: Utc::now(),
                            });
                            fallback = Some(format!("Sorry, I could not get a response from the model: {e}"));
                            if failures >= self.options.max_consecutive_failures.max(1) {
                                RoundState::Terminal(Termination::Degraded)
                            } else {
                                RoundState::AwaitModel
                            }
                        }
                    }
                }
                RoundState::HaveToolRequests(calls) => {
                    tool_results += self.execute(rounds, &calls, conversation, log).await;
                    RoundState::AwaitModel
                }
                RoundState::Terminal(termination) => break termination,
            };
            conversation.validate()?;
        };

        let produced = &conversation.messages[first_new.min(conversation.messages.len())..];
        let answer = match termination {
            Termination::StoppedByModel => last_answer(produced).unwrap_or_default().to_string(),
            Termination::Degraded => fallback.unwrap_or_default(),
            Termination::RoundLimitExhausted => last_answer(produced)
                .map(str::to_string)
                .or(fallback)
                .unwrap_or_else(|| ROUND_LIMIT_MARKER.to_string()),
        };

        info!(
            conversation_id = %conversation.id,
            rounds,
            tool_results,
            termination = ?termination,
            "Conversation processed"
        );

        Ok(RunOutcome {
            answer,
            termination,
            rounds,
            tool_results,
        })
    }

    fn request(&self, conversation: &Conversation, definitions: &[ToolDefinition]) -> ProviderRequest {
        ProviderRequest {
            model: self.options.model.clone(),
            messages: conversation.messages.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            tools: definitions.to_vec(),
            stop: Vec::new(),
        }
    }

    /// Record the assistant turn and decide what happens next.
    fn absorb(&self, conversation: &mut Conversation, response: ProviderResponse) -> RoundState {
        let stopped = response.is_stop();
        let mut message = response.message;

        self.event_bus.publish(DomainEvent::ResponseGenerated {
            conversation_id: conversation.id.to_string(),
            model: response.model,
            tokens_used: response.usage.map_or(0, |u| u.total_tokens),
            tool_requests: message.tool_calls.len(),
            timestamp: Utc::now(),
        });

        if stopped && !message.tool_calls.is_empty() {
            debug!(dropped = message.tool_calls.len(), "Ignoring tool requests on a finished response");
            message.tool_calls.clear();
        }

        if !stopped && message.tool_calls.is_empty() && self.options.text_call_fallback {
            message.tool_calls = parse_text_calls(&message.content, |name| self.dispatcher.contains(name));
            if !message.tool_calls.is_empty() {
                info!(count = message.tool_calls.len(), "Recovered tool requests from text");
            }
        }

        if message.tool_calls.is_empty() {
            conversation.push(message);
            return RoundState::Terminal(Termination::StoppedByModel);
        }

        let limit = self.options.max_tool_calls_per_message.max(1);
        if message.tool_calls.len() > limit {
            debug!(
                requested = message.tool_calls.len(),
                limit,
                "Dropping tool requests over the per-turn limit"
            );
            message.tool_calls.truncate(limit);
        }

        let calls = message.tool_calls.clone();
        conversation.push(message);
        RoundState::HaveToolRequests(calls)
    }

    /// Execute requests one after another, appending a result turn and a log
    /// record for each. Returns how many ran.
    async fn execute(
        &self,
        round: u32,
        calls: &[MessageToolCall],
        conversation: &mut Conversation,
        log: &mut ToolCallLog,
    ) -> usize {
        for call in calls {
            let arguments = Value::Object(match &call.arguments {
                ToolArguments::Text(text) => recover_payload(text),
                ToolArguments::Structured(map) => map.clone(),
            });

            let result = self
                .dispatcher
                .dispatch(&ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: arguments.clone(),
                })
                .await;

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: result.tool_name.clone(),
                service: result.service.clone(),
                success: result.success,
                duration_ms: result.duration_ms,
                timestamp: Utc::now(),
            });

            conversation.push(Message::tool_result(&call.id, &result.output));
            log.record(ToolCallRecord::new(round, &result, arguments, call.source));
        }
        calls.len()
    }
}

fn last_answer(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.content.is_empty())
        .map(|m| m.content.as_str())
}
