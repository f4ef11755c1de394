//! Message and Conversation domain types.
//!
//! A conversation is a strictly ordered list of turns: one pinned system turn,
//! then user, assistant and tool-result turns. Tool results always follow the
//! assistant turn whose request they answer.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscriptError;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Retained by history trimming even when outside the recent window
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub important: bool,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (provider info, service attribution, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            important: false,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message carrying tool requests.
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.into());
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Flag this turn for retention during history trimming.
    pub fn mark_important(mut self) -> Self {
        self.important = true;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Character length of everything this turn contributes to a prompt.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
            + self
                .tool_calls
                .iter()
                .map(|tc| tc.name.len() + tc.arguments.as_text().chars().count())
                .sum::<usize>()
    }
}

/// Where a tool request came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSource {
    /// Native structured tool calling.
    #[default]
    Native,
    /// Recovered from free assistant text; lower confidence.
    TextFallback,
}

/// Arguments of a tool request, as the model supplied them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    /// Already structured.
    Structured(serde_json::Map<String, serde_json::Value>),
    /// Raw text that still has to go through payload recovery.
    Text(String),
}

impl ToolArguments {
    /// Render the arguments as the JSON text providers expect.
    pub fn as_text(&self) -> String {
        match self {
            Self::Structured(map) => {
                serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
            }
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for ToolArguments {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ToolArguments {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments, raw or structured
    pub arguments: ToolArguments,

    /// How the request was obtained
    #[serde(default)]
    pub source: CallSource,
}

impl MessageToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<ToolArguments>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
            source: CallSource::Native,
        }
    }
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a conversation whose first turn is the given system prompt.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.messages.push(Message::system(prompt));
        conv
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// The pinned system turn, if present.
    pub fn system(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    /// Content of the most recent assistant turn.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }

    /// Total character count of all turns.
    pub fn char_count(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.char_count() / 4
    }

    /// Check that every tool result answers a request of the nearest
    /// preceding assistant turn and that only the first turn is a system turn.
    pub fn validate(&self) -> std::result::Result<(), TranscriptError> {
        let mut open: Option<HashSet<&str>> = None;

        for (position, msg) in self.messages.iter().enumerate() {
            match msg.role {
                Role::System => {
                    if position != 0 {
                        return Err(TranscriptError::MisplacedSystem { position });
                    }
                    open = None;
                }
                Role::User => open = None,
                Role::Assistant => {
                    open = Some(msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect());
                }
                Role::Tool => {
                    let call_id = msg
                        .tool_call_id
                        .as_deref()
                        .ok_or(TranscriptError::MissingCallId { position })?;
                    let answered = open.as_ref().is_some_and(|ids| ids.contains(call_id));
                    if !answered {
                        return Err(TranscriptError::OrphanedResult {
                            position,
                            call_id: call_id.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.important);
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("Test message").mark_important();
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test message");
        assert_eq!(deserialized.role, Role::User);
        assert!(deserialized.important);
    }

    #[test]
    fn conversation_token_estimate() {
        let mut conv = Conversation::new();
        // 20 chars ≈ 5 tokens
        conv.push(Message::user("12345678901234567890"));
        assert_eq!(conv.estimated_tokens(), 5);
    }

    #[test]
    fn estimate_counts_characters_not_bytes() {
        let mut conv = Conversation::new();
        conv.push(Message::user("ééééééééé"));
        assert_eq!(conv.char_count(), 9);
    }

    #[test]
    fn untagged_arguments_deserialize_by_shape() {
        let text: ToolArguments = serde_json::from_str(r#""{\"q\": 1}""#).unwrap();
        assert!(matches!(text, ToolArguments::Text(_)));

        let structured: ToolArguments = serde_json::from_str(r#"{"q": 1}"#).unwrap();
        assert!(matches!(structured, ToolArguments::Structured(_)));
        assert_eq!(structured.as_text(), r#"{"q":1}"#);
    }

    #[test]
    fn validate_accepts_answered_requests() {
        let mut conv = Conversation::with_system("sys");
        conv.push(Message::user("search"));
        conv.push(Message::assistant_with_calls(
            "",
            vec![
                MessageToolCall::new("a", "web_search", "{}"),
                MessageToolCall::new("b", "web_search", "{}"),
            ],
        ));
        conv.push(Message::tool_result("a", "one"));
        conv.push(Message::tool_result("b", "two"));
        conv.push(Message::assistant("done"));
        assert!(conv.validate().is_ok());
    }

    #[test]
    fn validate_rejects_orphaned_result() {
        let mut conv = Conversation::with_system("sys");
        conv.push(Message::user("hi"));
        conv.push(Message::tool_result("ghost", "boo"));
        assert_eq!(
            conv.validate(),
            Err(TranscriptError::OrphanedResult {
                position: 2,
                call_id: "ghost".into()
            })
        );
    }

    #[test]
    fn validate_rejects_result_after_user_turn() {
        let mut conv = Conversation::with_system("sys");
        conv.push(Message::assistant_with_calls("", vec![MessageToolCall::new("a", "t", "{}")]));
        conv.push(Message::user("interrupt"));
        conv.push(Message::tool_result("a", "late"));
        assert!(conv.validate().is_err());
    }

    #[test]
    fn validate_rejects_second_system_turn() {
        let mut conv = Conversation::with_system("sys");
        conv.push(Message::system("again"));
        assert_eq!(
            conv.validate(),
            Err(TranscriptError::MisplacedSystem { position: 1 })
        );
    }

    #[test]
    fn last_assistant_content_skips_empty_turns() {
        let mut conv = Conversation::with_system("sys");
        conv.push(Message::assistant("thinking out loud"));
        conv.push(Message::assistant_with_calls("", vec![MessageToolCall::new("a", "t", "{}")]));
        assert_eq!(conv.last_assistant_content(), Some("thinking out loud"));
    }
}
