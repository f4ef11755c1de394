//! The synthetic `batch_exec` tool: run one tool over many argument sets.

use serde_json::{Value, json};
use toolweave_core::tool::{ToolDescriptor, ToolOutput};
use tracing::debug;

use crate::dispatcher::ToolDispatcher;

pub const BATCH_TOOL: &str = "batch_exec";

/// Service name reported for `batch_exec`.
pub const BATCH_SERVICE: &str = "local-batch";

const DEFAULT_MAX_CONCURRENCY: u64 = 4;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: BATCH_TOOL.to_string(),
        description: "Call one tool several times in a single step. Give the target tool name \
                      and a list of argument objects; results come back in input order."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "tool": {
                    "type": "string",
                    "description": "Name of an existing tool to call"
                },
                "args_list": {
                    "type": "array",
                    "items": {"type": "object"},
                    "description": "One argument object per call, in execution order"
                },
                "mode": {
                    "type": "string",
                    "enum": ["sequential", "parallel"],
                    "default": "sequential"
                },
                "max_concurrency": {
                    "type": "integer",
                    "minimum": 1,
                    "default": DEFAULT_MAX_CONCURRENCY
                }
            },
            "required": ["tool", "args_list"]
        }),
        service: BATCH_SERVICE.to_string(),
    }
}

/// Whether a batch envelope reports that the batch as a whole failed.
pub fn envelope_failed(output: &ToolOutput) -> bool {
    matches!(output, ToolOutput::Structured(v) if v.get("success") == Some(&Value::Bool(false)))
}

/// Execute a batch. Entries always run one after another, whatever `mode`
/// asks for; a failing entry is recorded and the batch moves on.
pub async fn run(dispatcher: &ToolDispatcher, arguments: Value) -> Value {
    let Some(tool) = arguments.get("tool").and_then(Value::as_str) else {
        return failure("missing 'tool'");
    };
    if tool == BATCH_TOOL || !dispatcher.registry().contains(tool) {
        return failure(&format!("unknown tool '{tool}'"));
    }
    let Some(entries) = arguments.get("args_list").and_then(Value::as_array) else {
        return failure("'args_list' must be an array");
    };

    debug!(
        tool,
        entries = entries.len(),
        mode = arguments.get("mode").and_then(serde_json::Value::as_str).unwrap_or("sequential"),
        max_concurrency = arguments
            .get("max_concurrency")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1),
        "Running batch"
    );

    let mut results = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_object() {
            results.push(json!({
                "index": index,
                "success": false,
                "error": "each entry of args_list must be an object"
            }));
            continue;
        }

        let result = match dispatcher.invoke_tool(tool, entry.clone()).await {
            Ok(ToolOutput::Error(error)) => json!({"index": index, "success": false, "error": error}),
            Ok(output) => json!({"index": index, "success": true, "data": output.into_value()}),
            Err(e) => json!({"index": index, "success": false, "error": e.to_string()}),
        };
        results.push(result);
    }

    json!({"success": true, "results": results})
}

fn failure(error: &str) -> Value {
    json!({"success": false, "error": error})
}
