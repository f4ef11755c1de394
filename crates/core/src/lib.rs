//! # toolweave core
//!
//! Domain types, traits, and error definitions for the toolweave
//! tool-calling engine. This crate has **no framework dependencies**; it
//! defines the model every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: turns and the conversation transcript
//! - [`provider`]: the text-generation backend trait
//! - [`tool`]: the tool trait, tool outputs and the registry
//! - [`payload`]: recovery of tool arguments from unreliable text
//! - [`event`]: progress events

pub mod error;
pub mod event;
pub mod message;
pub mod payload;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{CallSource, Conversation, ConversationId, Message, MessageToolCall, Role, ToolArguments};
pub use payload::recover_payload;
pub use provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolDescriptor, ToolOutput, ToolRegistry, ToolResult};
