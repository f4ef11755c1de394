//! Blocking façade over one tool-provider connection.
//!
//! Each [`ToolProviderBridge`] owns a dedicated worker thread running a
//! single-threaded tokio runtime. Public methods enqueue a command for that
//! worker and block the calling thread until the reply arrives or the
//! per-bridge timeout elapses, so callers never need a runtime of their own.
//! Calls to one bridge are serialized by its worker; distinct bridges run
//! independently.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc as std_mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use toolweave_core::tool::{ToolDescriptor, ToolOutput};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::spec::BridgeSpec;
use crate::transport::{self, ProviderTransport, RemoteTool};

/// Longest tool description passed on to the model.
pub const MAX_DESCRIPTION_CHARS: usize = 1024;

/// Bound on each phase of an orderly shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Slack between the worker's own timeout and the caller giving up.
const REPLY_GRACE: Duration = Duration::from_millis(250);

type Reply<T> = std_mpsc::SyncSender<Result<T, BridgeError>>;

enum Command {
    ListTools {
        reply: Reply<Vec<RemoteTool>>,
    },
    Call {
        tool: String,
        arguments: Value,
        /// When the caller stops waiting; an expired call is never sent.
        deadline: Instant,
        reply: Reply<Value>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

enum Connector {
    Spec,
    Ready(Box<dyn ProviderTransport>),
}

/// Attribution details for logs and error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub service_name: String,
    pub working_directory: Option<PathBuf>,
    pub command: String,
    pub args: Vec<String>,
    pub tool_names: Vec<String>,
}

pub struct ToolProviderBridge {
    spec: BridgeSpec,
    commands: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    done: Mutex<Option<std_mpsc::Receiver<()>>>,
    tool_names: Mutex<Vec<String>>,
    stopped: AtomicBool,
}

impl ToolProviderBridge {
    /// Connect to the provider described by `spec`.
    ///
    /// Blocks until the handshake completes. A failed handshake tears the
    /// worker down again and returns [`BridgeError::Connect`].
    pub fn connect(spec: BridgeSpec) -> Result<Self, BridgeError> {
        Self::start(spec, Connector::Spec)
    }

    /// Run a bridge over an already-built transport.
    pub fn with_transport(
        spec: BridgeSpec,
        transport: Box<dyn ProviderTransport>,
    ) -> Result<Self, BridgeError> {
        Self::start(spec, Connector::Ready(transport))
    }

    fn start(spec: BridgeSpec, connector: Connector) -> Result<Self, BridgeError> {
        let (commands, queue) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), BridgeError>>(1);
        let (done_tx, done_rx) = std_mpsc::sync_channel::<()>(1);

        let worker_spec = spec.clone();
        let handle = std::thread::Builder::new()
            .name(format!("bridge-{}", spec.name))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(BridgeError::Io(e.to_string())));
                        return;
                    }
                };
                runtime.block_on(run_worker(worker_spec, connector, queue, ready_tx));
                drop(runtime);
                let _ = done_tx.send(());
            })
            .map_err(|e| BridgeError::Connect {
                service: spec.name.clone(),
                reason: format!("failed to start worker thread: {e}"),
            })?;

        match ready_rx.recv_timeout(spec.timeout + REPLY_GRACE) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(match e {
                    BridgeError::Connect { .. } => e,
                    other => BridgeError::Connect {
                        service: spec.name.clone(),
                        reason: other.to_string(),
                    },
                });
            }
            Err(_) => {
                // The worker is stuck in the handshake; it exits once it
                // notices the command channel is gone.
                return Err(BridgeError::Connect {
                    service: spec.name.clone(),
                    reason: format!("handshake did not finish within {:?}", spec.timeout),
                });
            }
        }

        info!(service = %spec.name, command = %spec.command(), "Connected to tool provider");

        Ok(Self {
            spec,
            commands,
            worker: Mutex::new(Some(handle)),
            done: Mutex::new(Some(done_rx)),
            tool_names: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn timeout(&self) -> Duration {
        self.spec.timeout
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Discover the provider's tools.
    ///
    /// Descriptions are cut to [`MAX_DESCRIPTION_CHARS`]; a missing schema
    /// becomes an empty object schema.
    pub fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let remote = self.submit(|reply| Command::ListTools { reply }, self.spec.timeout)?;

        let descriptors: Vec<ToolDescriptor> = remote
            .into_iter()
            .map(|tool| ToolDescriptor {
                description: truncate_chars(tool.description.as_deref().unwrap_or_default(), MAX_DESCRIPTION_CHARS),
                parameters: tool
                    .input_schema
                    .filter(|schema| schema.is_object())
                    .unwrap_or_else(empty_schema),
                name: tool.name,
                service: self.spec.name.clone(),
            })
            .collect();

        if let Ok(mut names) = self.tool_names.lock() {
            *names = descriptors.iter().map(|d| d.name.clone()).collect();
        }
        debug!(service = %self.spec.name, tools = descriptors.len(), "Listed tools");
        Ok(descriptors)
    }

    /// Attribution for this provider. Tool names are those seen by the last
    /// [`list_tools`](Self::list_tools).
    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo {
            service_name: self.spec.name.clone(),
            working_directory: self.spec.working_directory().cloned(),
            command: self.spec.command().to_string(),
            args: self.spec.args().to_vec(),
            tool_names: self
                .tool_names
                .lock()
                .map(|names| names.clone())
                .unwrap_or_default(),
        }
    }

    /// Invoke a tool and block for its result.
    ///
    /// Provider-side failures come back as [`ToolOutput::Error`] (or as
    /// recovered text, see [`interpret_call_result`]). `Err` means the
    /// provider could not be reached: a timeout leaves the bridge usable, a
    /// closed channel does not.
    pub fn call(&self, tool: &str, arguments: Map<String, Value>) -> Result<ToolOutput, BridgeError> {
        let tool_name = tool.to_string();
        let deadline = Instant::now() + self.spec.timeout;
        let outcome = self.submit(
            |reply| Command::Call {
                tool: tool_name,
                arguments: Value::Object(arguments),
                deadline,
                reply,
            },
            self.spec.timeout,
        );

        match outcome {
            Ok(result) => Ok(interpret_call_result(result)),
            Err(BridgeError::Rpc { message, .. }) => Ok(recover_error_text(&message)),
            Err(e) => {
                warn!(service = %self.spec.name, tool, error = %e, "Tool call failed");
                Err(e)
            }
        }
    }

    /// Close the provider connection and end the worker.
    ///
    /// Safe to call any number of times; only the first call does anything.
    /// Each shutdown phase is bounded, and a worker that does not finish in
    /// time is detached rather than joined.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let (reply, closed) = std_mpsc::sync_channel(1);
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            match closed.recv_timeout(SHUTDOWN_GRACE) {
                Ok(Ok(())) => debug!(service = %self.spec.name, "Tool provider closed"),
                Ok(Err(e)) => debug!(service = %self.spec.name, error = %e, "Tool provider close failed"),
                Err(_) => debug!(service = %self.spec.name, "Tool provider close timed out"),
            }
        }

        let finished = self
            .done
            .lock()
            .ok()
            .and_then(|mut done| done.take())
            .is_some_and(|done| done.recv_timeout(SHUTDOWN_GRACE).is_ok());

        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        match handle {
            Some(handle) if finished => {
                let _ = handle.join();
                info!(service = %self.spec.name, "Bridge stopped");
            }
            Some(_) => warn!(service = %self.spec.name, "Bridge worker did not finish, detaching it"),
            None => {}
        }
    }

    fn submit<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        timeout: Duration,
    ) -> Result<T, BridgeError> {
        if self.is_stopped() {
            return Err(BridgeError::Stopped(self.spec.name.clone()));
        }

        let (reply, response) = std_mpsc::sync_channel(1);
        self.commands
            .send(build(reply))
            .map_err(|_| BridgeError::ChannelClosed)?;

        match response.recv_timeout(timeout + REPLY_GRACE) {
            Ok(result) => result,
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(BridgeError::timeout(&self.spec.name, timeout)),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(BridgeError::ChannelClosed),
        }
    }
}

impl Drop for ToolProviderBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ToolProviderBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProviderBridge")
            .field("service", &self.spec.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

async fn run_worker(
    spec: BridgeSpec,
    connector: Connector,
    mut queue: mpsc::UnboundedReceiver<Command>,
    ready: std_mpsc::SyncSender<Result<(), BridgeError>>,
) {
    let connected = match connector {
        Connector::Ready(transport) => Ok(transport),
        Connector::Spec => match tokio::time::timeout(spec.timeout, transport::connect(&spec)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Connect {
                service: spec.name.clone(),
                reason: format!("handshake did not finish within {:?}", spec.timeout),
            }),
        },
    };

    let mut transport = match connected {
        Ok(transport) => {
            let _ = ready.send(Ok(()));
            transport
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let timed_out = || BridgeError::timeout(&spec.name, spec.timeout);

    while let Some(command) = queue.recv().await {
        match command {
            Command::ListTools { reply } => {
                let result = tokio::time::timeout(spec.timeout, transport.list_tools())
                    .await
                    .unwrap_or_else(|_| Err(timed_out()));
                let _ = reply.send(result);
            }
            Command::Call {
                tool,
                arguments,
                deadline,
                reply,
            } => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!(service = %spec.name, tool = %tool, "Skipping tool call queued past its deadline");
                    let _ = reply.send(Err(timed_out()));
                    continue;
                }
                let result = tokio::time::timeout(remaining, transport.call_tool(&tool, arguments))
                    .await
                    .unwrap_or_else(|_| Err(timed_out()));
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                let result = tokio::time::timeout(SHUTDOWN_GRACE, transport.close())
                    .await
                    .unwrap_or_else(|_| Err(timed_out()));
                let _ = reply.send(result);
                return;
            }
        }
    }

    // Every sender is gone without a shutdown request.
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, transport.close()).await;
}

/// Turn a `tools/call` result object into a tool output.
///
/// Structured content wins over text; text segments are joined with
/// newlines. A result flagged `isError` goes through the same recovery as a
/// JSON-RPC error.
pub fn interpret_call_result(result: Value) -> ToolOutput {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter(|segment| segment.get("type").and_then(Value::as_str).is_none_or(|t| t == "text"))
                .filter_map(|segment| segment.get("text").and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return recover_error_text(&text);
    }

    match result.get("structuredContent") {
        Some(structured) if !structured.is_null() => ToolOutput::Structured(structured.clone()),
        _ if !text.is_empty() => ToolOutput::Text(text),
        _ => ToolOutput::Empty,
    }
}

/// Salvage a payload from a provider failure message.
///
/// Providers that validate their own output schema sometimes reject a result
/// that is really a list of strings, quoting it in the error. The span from
/// the first `[` to the last `]` is parsed as a JSON array and its string
/// elements are joined; anything else leaves the raw error text.
pub fn recover_error_text(message: &str) -> ToolOutput {
    let recovered = message
        .find('[')
        .zip(message.rfind(']'))
        .filter(|(start, end)| start < end)
        .and_then(|(start, end)| serde_json::from_str::<Vec<Value>>(&message[start..=end]).ok())
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|joined| !joined.is_empty());

    match recovered {
        Some(text) => ToolOutput::Text(text),
        None => ToolOutput::Error(message.to_string()),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}
