//! End-user session: a round controller with history retention, a call log,
//! and a readable summary of the tools each answer used.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolweave_config::AppConfig;
use toolweave_core::event::EventBus;
use toolweave_core::message::{Message, Role};
use toolweave_core::provider::Provider;
use toolweave_tools::ToolDispatcher;
use tracing::info;

use crate::call_log::{self, ToolCallLog, ToolCallRecord, ToolStats};
use crate::controller::{ControllerOptions, RoundController, Termination};
use crate::history::{HistoryManager, HistoryPolicy};

/// Facts about the situation a message arrived in, prepended to it.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub current_time: Option<String>,
    pub sender: Option<String>,
    pub subject: Option<String>,
}

impl MessageContext {
    /// Context stamped with the local time.
    pub fn now() -> Self {
        Self {
            current_time: Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            ..Self::default()
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    fn apply(&self, message: &str) -> String {
        let mut lines = Vec::new();
        if let Some(time) = &self.current_time {
            lines.push(format!("Current time: {time}"));
        }
        if let Some(subject) = &self.subject {
            lines.push(format!("Subject: {subject}"));
        }
        if let Some(sender) = &self.sender {
            lines.push(format!("From: {sender}"));
        }
        if lines.is_empty() {
            message.to_string()
        } else {
            format!("{}\n\n{message}", lines.join("\n"))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReply {
    /// The answer followed by the tool summary, when tools ran
    pub text: String,
    /// The model's answer alone
    pub answer: String,
    pub termination: Termination,
    pub rounds: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub user_turns: usize,
    pub assistant_turns: usize,
    pub estimated_tokens: usize,
    pub tool_calls: usize,
    pub success_rate: Option<f64>,
    pub per_tool: BTreeMap<String, ToolStats>,
}

pub struct AgentSession {
    controller: RoundController,
    history: HistoryManager,
    log: ToolCallLog,
    welcome: Option<String>,
}

impl AgentSession {
    /// Session bounded by `[agent] max_rounds` rather than the unattended limit.
    pub fn new(provider: Arc<dyn Provider>, dispatcher: Arc<ToolDispatcher>, config: &AppConfig) -> Self {
        let options = ControllerOptions {
            max_rounds: config.agent.max_rounds,
            ..ControllerOptions::from_config(config)
        };
        let mut session = Self {
            controller: RoundController::new(provider, dispatcher, options),
            history: HistoryManager::new(config.system_prompt(), HistoryPolicy::from_config(&config.agent)),
            log: ToolCallLog::new(),
            welcome: config.agent.welcome_message.clone(),
        };
        session.greet();
        session
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.controller = self.controller.with_event_bus(event_bus);
        self
    }

    pub fn welcome(&self) -> Option<&str> {
        self.welcome.as_deref()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn call_log(&self) -> &ToolCallLog {
        &self.log
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.controller.event_bus()
    }

    fn greet(&mut self) {
        if let Some(welcome) = &self.welcome {
            self.history.push(Message::assistant(welcome.clone()));
        }
    }

    /// Handle one user message end to end.
    pub async fn process_message(
        &mut self,
        message: &str,
        context: Option<&MessageContext>,
    ) -> toolweave_core::Result<SessionReply> {
        let content = context.map_or_else(|| message.to_string(), |c| c.apply(message));
        self.history.push(Message::user(content));

        let first_record = self.log.len();
        let outcome = self
            .controller
            .run(self.history.conversation_mut(), &mut self.log)
            .await?;
        let tool_calls = self.log.since(first_record).to_vec();

        if !tool_calls.is_empty() && outcome.termination == Termination::StoppedByModel {
            self.history.mark_last_assistant_important();
        }

        let mut text = outcome.answer.clone();
        text.push_str(&tool_summary(&tool_calls));

        self.history.trim();
        self.log_stats();

        Ok(SessionReply {
            text,
            answer: outcome.answer,
            termination: outcome.termination,
            rounds: outcome.rounds,
            tool_calls,
        })
    }

    pub fn stats(&self) -> SessionStats {
        let messages = &self.history.conversation().messages;
        let count = |role: Role| messages.iter().filter(|m| m.role == role).count();
        SessionStats {
            user_turns: count(Role::User),
            assistant_turns: count(Role::Assistant),
            estimated_tokens: self.history.estimated_tokens(),
            tool_calls: self.log.len(),
            success_rate: self.log.success_rate(),
            per_tool: self.log.stats(),
        }
    }

    /// Forget the conversation and the call log; the system turn and the
    /// greeting stay.
    pub fn reset(&mut self) {
        self.history.reset();
        self.log.clear();
        self.greet();
        info!("Session reset");
    }

    fn log_stats(&self) {
        let stats = self.stats();
        info!(
            user_turns = stats.user_turns,
            assistant_turns = stats.assistant_turns,
            tool_calls = stats.tool_calls,
            success_rate = ?stats.success_rate,
            "Conversation statistics"
        );
        for (tool, s) in &stats.per_tool {
            info!(tool = %tool, calls = s.calls, failures = s.failures(), "Tool usage");
        }
    }
}

/// Readable summary of the calls behind one answer. Empty when no tool ran.
pub fn tool_summary(records: &[ToolCallRecord]) -> String {
    let Some(rate) = call_log::success_rate(records) else {
        return String::new();
    };
    let (ok, failed): (Vec<&ToolCallRecord>, Vec<&ToolCallRecord>) = records.iter().partition(|r| r.success);

    let mut out = String::from("\n\n--- Tool summary ---\n");
    if !ok.is_empty() {
        out.push_str(&format!("Succeeded ({}):\n", ok.len()));
        for r in &ok {
            out.push_str(&format!("  - [{}] {}\n", r.service, r.tool_name));
        }
    }
    if !failed.is_empty() {
        out.push_str(&format!("Failed ({}):\n", failed.len()));
        for r in &failed {
            let reason = r.output.lines().next().unwrap_or_default();
            out.push_str(&format!("  - [{}] {}: {reason}\n", r.service, r.tool_name));
        }
    }
    out.push_str(&format!(
        "Overall: {}/{} succeeded ({:.1}%)",
        ok.len(),
        records.len(),
        rate * 100.0
    ));
    out
}
