//! Conversation history with size-bounded retention.
//!
//! Token counts are estimated from characters (four per token), so the
//! budget is advisory rather than exact.

use toolweave_config::AgentConfig;
use toolweave_core::message::{Conversation, Message, Role};
use tracing::debug;

/// Share of the budget that retained important turns may fill.
const IMPORTANT_SHARE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// Trim once the estimate exceeds this many tokens
    pub budget_tokens: usize,
    /// Most recent non-system turns that are always kept
    pub keep_recent: usize,
    /// No trimming until the conversation has more turns than this
    pub min_turns: usize,
}

impl HistoryPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            budget_tokens: config.history_budget_tokens,
            keep_recent: config.keep_recent,
            min_turns: config.min_turns_before_trim,
        }
    }
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// What a trim pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimReport {
    pub removed: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Owns one conversation and keeps it within the history policy.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    conversation: Conversation,
    policy: HistoryPolicy,
}

impl HistoryManager {
    pub fn new(system_prompt: impl Into<String>, policy: HistoryPolicy) -> Self {
        Self {
            conversation: Conversation::with_system(system_prompt),
            policy,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    pub fn push(&mut self, message: Message) {
        self.conversation.push(message);
    }

    pub fn len(&self) -> usize {
        self.conversation.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversation.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.conversation.estimated_tokens()
    }

    /// Flag the latest assistant turn for retention.
    pub fn mark_last_assistant_important(&mut self) {
        if let Some(turn) = self
            .conversation
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
        {
            turn.important = true;
        }
    }

    /// Apply the retention policy. Returns `None` when nothing needed doing.
    pub fn trim(&mut self) -> Option<TrimReport> {
        let tokens_before = self.estimated_tokens();
        let kept = trim_messages(&self.conversation.messages, &self.policy)?;

        let removed = self.conversation.messages.len() - kept.len();
        self.conversation.messages = kept;
        let report = TrimReport {
            removed,
            tokens_before,
            tokens_after: self.estimated_tokens(),
        };
        debug!(
            removed = report.removed,
            tokens_before = report.tokens_before,
            tokens_after = report.tokens_after,
            "Trimmed conversation history"
        );
        Some(report)
    }

    /// Drop everything except the system turn.
    pub fn reset(&mut self) {
        self.conversation.messages.truncate(usize::from(self.conversation.system().is_some()));
    }
}

/// Whether a turn may be kept outside the recent window on its own.
///
/// Tool results and turns carrying tool requests only make sense next to
/// their counterpart, so they are never kept in isolation.
fn retainable(message: &Message) -> bool {
    message.important && message.role != Role::Tool && message.tool_calls.is_empty()
}

fn tokens_of(chars: usize) -> usize {
    chars / 4
}

/// Compute the retained turns, or `None` when the policy does not call for
/// trimming yet.
///
/// The result is the system turn, then retained important turns in their
/// original order, then the recent window. The recent window is widened
/// backwards until it no longer starts with a tool result.
pub fn trim_messages(messages: &[Message], policy: &HistoryPolicy) -> Option<Vec<Message>> {
    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, messages),
    };

    let total_chars: usize = messages.iter().map(Message::char_len).sum();
    if tokens_of(total_chars) <= policy.budget_tokens || rest.len() <= policy.min_turns {
        return None;
    }

    let mut start = rest.len().saturating_sub(policy.keep_recent);
    while start > 0 && rest.get(start).is_some_and(|m| m.role == Role::Tool) {
        start -= 1;
    }
    let (older, recent) = rest.split_at(start);

    let ceiling = (policy.budget_tokens as f64 * IMPORTANT_SHARE) as usize;
    let mut used_chars = system.map_or(0, Message::char_len) + recent.iter().map(Message::char_len).sum::<usize>();
    let mut important: Vec<&Message> = Vec::new();
    for message in older.iter().rev().filter(|m| retainable(m)) {
        let with_this = used_chars + message.char_len();
        if tokens_of(with_this) > ceiling {
            break;
        }
        used_chars = with_this;
        important.push(message);
    }
    important.reverse();

    let mut kept = Vec::with_capacity(1 + important.len() + recent.len());
    kept.extend(system.cloned());
    kept.extend(important.into_iter().cloned());
    kept.extend(recent.iter().cloned());
    Some(kept)
}
