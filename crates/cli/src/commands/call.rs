//! `toolweave call`: invoke a single tool through the dispatcher.

use anyhow::{Context, bail};
use serde_json::Value;
use std::path::Path;
use toolweave_core::tool::ToolCall;

use super::{load_config, start_dispatcher, stop_dispatcher};

pub async fn run(config_path: Option<&Path>, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments: Value = serde_json::from_str(args).context("Arguments must be valid JSON")?;
    if !arguments.is_object() {
        bail!("Arguments must be a JSON object, got: {args}");
    }

    let config = load_config(config_path)?;
    let dispatcher = start_dispatcher(&config).await?;

    if !dispatcher.contains(tool) {
        let known = dispatcher.tool_names().join(", ");
        stop_dispatcher(dispatcher).await;
        bail!("Unknown tool '{tool}'. Available: {known}");
    }

    let result = dispatcher
        .dispatch(&ToolCall {
            id: "cli".into(),
            name: tool.to_string(),
            arguments,
        })
        .await;
    stop_dispatcher(dispatcher).await;

    println!("{}", result.output);
    if !result.success {
        bail!("[{}] {} failed after {} ms", result.service, result.tool_name, result.duration_ms);
    }
    Ok(())
}
