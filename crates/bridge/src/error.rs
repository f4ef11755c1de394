use std::time::Duration;
use thiserror::Error;

/// Failures talking to a tool provider.
///
/// Tool-level failures reported by the provider are not errors here; they
/// come back from [`crate::ToolProviderBridge::call`] as
/// `ToolOutput::Error`.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("failed to connect to tool provider '{service}': {reason}")]
    Connect { service: String, reason: String },

    #[error("tool provider '{service}' did not answer within {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("channel to tool provider closed")]
    ChannelClosed,

    #[error("bridge to '{0}' has been stopped")]
    Stopped(String),

    /// The provider answered with a JSON-RPC error object.
    #[error("provider error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl BridgeError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    pub(crate) fn timeout(service: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            timeout,
        }
    }

    /// Errors after which the bridge will never answer again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Stopped(_))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => Self::ChannelClosed,
            _ => Self::Io(err.to_string()),
        }
    }
}
