//! Tool-provider (MCP server) launch specifications.
//!
//! Accepts both the TOML layout (`[mcp_servers.mail]`) and the JSON layout
//! shared by desktop MCP clients (`"mcpServers": {"mail": {...}}`). Server
//! order is preserved exactly as written, since tool-name collisions resolve
//! in configuration order.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// How to reach a tool provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Spawn a local process and speak JSON-RPC over its stdin/stdout.
    Stdio,
    /// POST JSON-RPC to a streamable HTTP endpoint.
    #[serde(alias = "streamable-http", alias = "streamableHttp", alias = "sse")]
    Http,
}

/// One configured tool provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Executable to launch (stdio transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory for the launched process
    #[serde(
        default,
        alias = "workingDirectory",
        alias = "working_directory",
        skip_serializing_if = "Option::is_none"
    )]
    pub cwd: Option<PathBuf>,

    /// Extra environment for the launched process
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Endpoint for the HTTP transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Explicit transport; inferred from `url` / `command` when absent
    #[serde(
        default,
        rename = "transport",
        alias = "type",
        skip_serializing_if = "Option::is_none"
    )]
    pub transport: Option<TransportKind>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    /// Desktop-client spelling of `disabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Per-call timeout for this provider
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl McpServerConfig {
    /// A stdio server launched with `command args...`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    /// A server reached over HTTP.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            transport: Some(TransportKind::Http),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled && self.enabled != Some(false)
    }

    /// The transport to use, inferring HTTP when only a URL is given.
    pub fn transport_kind(&self) -> TransportKind {
        match self.transport {
            Some(kind) => kind,
            None if self.command.is_none() && self.url.is_some() => TransportKind::Http,
            None => TransportKind::Stdio,
        }
    }
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
            transport: None,
            disabled: false,
            enabled: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // env and header values often hold credentials
        f.debug_struct("McpServerConfig")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("transport", &self.transport_kind())
            .field("enabled", &self.is_enabled())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Named servers in configuration order.
#[derive(Debug, Clone, Default)]
pub struct McpServers(Vec<(String, McpServerConfig)>);

impl McpServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server. A repeated name replaces the earlier entry in place.
    pub fn insert(&mut self, name: impl Into<String>, config: McpServerConfig) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = config,
            None => self.0.push((name, config)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&McpServerConfig> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &McpServerConfig)> {
        self.0.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Only the servers that are not disabled.
    pub fn enabled(&self) -> impl Iterator<Item = (&str, &McpServerConfig)> {
        self.iter().filter(|(_, c)| c.is_enabled())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for McpServers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, config) in &self.0 {
            map.serialize_entry(name, config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for McpServers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ServersVisitor;

        impl<'de> Visitor<'de> for ServersVisitor {
            type Value = McpServers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of server name to server configuration")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<McpServers, A::Error> {
                let mut servers = McpServers::new();
                while let Some((name, config)) = access.next_entry::<String, McpServerConfig>()? {
                    servers.insert(name, config);
                }
                Ok(servers)
            }
        }

        deserializer.deserialize_map(ServersVisitor)
    }
}
