//! Tool registry, dispatch and result shaping for toolweave.
//!
//! The [`ToolDispatcher`] gathers tools from every configured provider
//! bridge, adds the synthetic `batch_exec` tool, applies pre-call argument
//! hooks, and turns every outcome into a compressed [`ToolResult`].
//!
//! [`ToolResult`]: toolweave_core::tool::ToolResult

pub mod batch;
pub mod compress;
pub mod dispatcher;
pub mod format;
pub mod hints;
pub mod mcp_tool;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BATCH_SERVICE, BATCH_TOOL};
pub use compress::{compress, compress_serializable, compress_text, squeeze_text};
pub use dispatcher::{ToolDispatcher, UNKNOWN_SERVICE};
pub use format::{EmailHtmlHook, PreCallHook};
pub use hints::ErrorHint;
pub use mcp_tool::McpTool;
