//! The round controller and the end-user session built on it.
//!
//! A [`RoundController`] alternates between the model and the tool
//! dispatcher:
//!
//! 1. **Send** every turn plus the tool definitions to the provider
//! 2. **If the model stops**: return its answer
//! 3. **If tools are requested**: execute them, append the results, loop
//! 4. **Otherwise**: return whatever the model said
//!
//! [`AgentSession`] wraps a controller with history retention, a tool call
//! log, and per-answer tool summaries.

pub mod call_log;
pub mod controller;
pub mod history;
pub mod session;
pub mod text_calls;

#[cfg(test)]
pub(crate) mod testing;

pub use call_log::{ToolCallLog, ToolCallRecord, ToolStats};
pub use controller::{ControllerOptions, ROUND_LIMIT_MARKER, RoundController, RunOutcome, Termination};
pub use history::{HistoryManager, HistoryPolicy, TrimReport, trim_messages};
pub use session::{AgentSession, MessageContext, SessionReply, SessionStats, tool_summary};
pub use text_calls::parse_text_calls;
