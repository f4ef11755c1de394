//! Newline-delimited JSON-RPC over a child process's stdin/stdout.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

use crate::error::BridgeError;
use crate::jsonrpc::{self, Incoming, Notification, Request};
use crate::spec::{BridgeSpec, TransportSpec};
use crate::transport::{ProviderTransport, RemoteTool, parse_tools_page};

pub struct StdioTransport {
    service: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioTransport {
    /// Spawn the provider process and run the initialize handshake.
    pub async fn connect(spec: &BridgeSpec) -> Result<Self, BridgeError> {
        let TransportSpec::Stdio {
            command,
            args,
            cwd,
            env,
        } = &spec.transport
        else {
            return Err(BridgeError::protocol("stdio transport needs a command"));
        };

        let connect_err = |reason: String| BridgeError::Connect {
            service: spec.name.clone(),
            reason,
        };

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| connect_err(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| connect_err("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connect_err("child stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let service = spec.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(service = %service, "{line}");
                }
            });
        }

        let mut transport = Self {
            service: spec.name.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        };

        transport
            .request("initialize", Some(jsonrpc::initialize_params()))
            .await
            .map_err(|e| connect_err(format!("initialize failed: {e}")))?;
        transport
            .notify("notifications/initialized")
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        debug!(service = %transport.service, "Tool provider initialized");
        Ok(transport)
    }

    async fn write_line(&mut self, line: String) -> Result<(), BridgeError> {
        let stdin = self.stdin.as_mut().ok_or(BridgeError::ChannelClosed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str) -> Result<(), BridgeError> {
        let line = serde_json::to_string(&Notification::new(method))
            .map_err(|e| BridgeError::protocol(e.to_string()))?;
        self.write_line(line).await
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.next_id += 1;
        let id = self.next_id;
        let line = serde_json::to_string(&Request::new(id, method, params))
            .map_err(|e| BridgeError::protocol(e.to_string()))?;
        trace!(service = %self.service, %method, id, "-> provider");
        self.write_line(line).await?;

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(BridgeError::ChannelClosed);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let incoming: Incoming = match serde_json::from_str(line) {
                Ok(incoming) => incoming,
                Err(_) => {
                    // Providers sometimes print banners on stdout.
                    debug!(service = %self.service, "Ignoring non-JSON line from provider");
                    continue;
                }
            };

            if incoming.answers(id) {
                return incoming.into_result();
            }
            if let Some(reply) = incoming.server_reply() {
                debug!(service = %self.service, method = ?incoming.method, "Answering provider request");
                self.write_line(reply.to_string()).await?;
                continue;
            }
            // A reply to a request that already timed out, or a notification.
            trace!(service = %self.service, method = ?incoming.method, "Skipping stale message");
        }
    }
}

#[async_trait]
impl ProviderTransport for StdioTransport {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, BridgeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let (page, next) = parse_tools_page(self.request("tools/list", params).await?)?;
            tools.extend(page);
            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        self.request(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        // Closing stdin asks a well-behaved provider to exit.
        self.stdin.take();
        match tokio::time::timeout(std::time::Duration::from_millis(500), self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(service = %self.service, %status, "Tool provider exited");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(service = %self.service, "Tool provider did not exit, killing it");
                self.child.kill().await.map_err(BridgeError::from)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A provider that pings the client in the middle of a tool call and
    /// reports whether the ping was answered.
    const PINGING_PROVIDER: &str = r#"
read -r init
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}'
read -r initialized
read -r call
printf '%s\n' '{"jsonrpc":"2.0","id":"srv-1","method":"ping"}'
read -r pong
case "$pong" in
  *'"id":"srv-1"'*'"result":{}'*) answer=pong-ok ;;
  *) answer=no-pong ;;
esac
printf '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$answer"
"#;

    #[tokio::test]
    async fn provider_ping_is_answered_during_a_call() {
        let spec = BridgeSpec::local("sh", vec!["-c".into(), PINGING_PROVIDER.into()], None).with_name("pinger");
        let mut transport = StdioTransport::connect(&spec).await.unwrap();

        let result = transport.call_tool("anything", json!({})).await.unwrap();

        assert_eq!(result["content"][0]["text"], "pong-ok");
        transport.close().await.unwrap();
    }
}
