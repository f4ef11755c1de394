//! Blocking bridges to remote tool providers.
//!
//! A [`ToolProviderBridge`] holds one long-lived connection to a tool
//! provider (a locally spawned process speaking JSON-RPC on stdio, or a
//! streamable HTTP endpoint) and exposes tool discovery, tool invocation and
//! an idempotent [`stop`](ToolProviderBridge::stop) as plain blocking calls.

pub mod bridge;
pub mod error;
pub mod http;
pub mod jsonrpc;
pub mod spec;
pub mod stdio;
pub mod transport;

pub use bridge::{MAX_DESCRIPTION_CHARS, ServiceInfo, ToolProviderBridge, interpret_call_result, recover_error_text};
pub use error::BridgeError;
pub use spec::{BridgeSpec, TransportSpec};
pub use transport::{ProviderTransport, RemoteTool};
