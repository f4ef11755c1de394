//! What a bridge connects to.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use toolweave_config::{McpServerConfig, McpServers, TransportKind};

use crate::error::BridgeError;

/// Name given to a provider launched from a bare command line.
pub const LOCAL_SERVICE_NAME: &str = "local";

/// How to reach one tool provider.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSpec {
    Stdio {
        command: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        env: BTreeMap<String, String>,
    },
    Http {
        url: String,
        headers: BTreeMap<String, String>,
    },
}

/// A named provider plus its per-call timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSpec {
    pub name: String,
    pub transport: TransportSpec,
    pub timeout: Duration,
}

impl BridgeSpec {
    /// A provider spawned locally as `command args...` in `cwd`.
    pub fn local(command: impl Into<String>, args: Vec<String>, cwd: Option<PathBuf>) -> Self {
        Self {
            name: LOCAL_SERVICE_NAME.to_string(),
            transport: TransportSpec::Stdio {
                command: command.into(),
                args,
                cwd,
                env: BTreeMap::new(),
            },
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from one configured server entry.
    pub fn from_server(name: &str, config: &McpServerConfig) -> Result<Self, BridgeError> {
        let missing = |what: &str| BridgeError::Connect {
            service: name.to_string(),
            reason: format!("{what} is not configured"),
        };

        let transport = match config.transport_kind() {
            TransportKind::Stdio => TransportSpec::Stdio {
                command: config.command.clone().ok_or_else(|| missing("command"))?,
                args: config.args.clone(),
                cwd: config.cwd.clone(),
                env: config.env.clone(),
            },
            TransportKind::Http => TransportSpec::Http {
                url: config.url.clone().ok_or_else(|| missing("url"))?,
                headers: config.headers.clone(),
            },
        };

        Ok(Self {
            name: name.to_string(),
            transport,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }

    /// Build from a provider configuration map.
    ///
    /// Accepts either `{"mcpServers": {"name": {...}}}` or the bare inner map.
    /// The first enabled entry is used.
    pub fn from_config_map(map: &serde_json::Value) -> Result<Self, BridgeError> {
        let inner = map.get("mcpServers").unwrap_or(map);
        let servers: McpServers =
            serde_json::from_value(inner.clone()).map_err(|e| BridgeError::Connect {
                service: LOCAL_SERVICE_NAME.to_string(),
                reason: format!("invalid provider configuration: {e}"),
            })?;

        let (name, config) = servers.enabled().next().ok_or_else(|| BridgeError::Connect {
            service: LOCAL_SERVICE_NAME.to_string(),
            reason: "configuration names no enabled provider".into(),
        })?;
        Self::from_server(name, config)
    }

    /// Working directory of a locally launched provider.
    pub fn working_directory(&self) -> Option<&PathBuf> {
        match &self.transport {
            TransportSpec::Stdio { cwd, .. } => cwd.as_ref(),
            TransportSpec::Http { .. } => None,
        }
    }

    /// The launch command, or the endpoint for HTTP providers.
    pub fn command(&self) -> &str {
        match &self.transport {
            TransportSpec::Stdio { command, .. } => command,
            TransportSpec::Http { url, .. } => url,
        }
    }

    pub fn args(&self) -> &[String] {
        match &self.transport {
            TransportSpec::Stdio { args, .. } => args,
            TransportSpec::Http { .. } => &[],
        }
    }
}
