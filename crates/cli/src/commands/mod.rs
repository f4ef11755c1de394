pub mod call;
pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod secretary;
pub mod status;
pub mod tools;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use toolweave_config::AppConfig;
use toolweave_core::provider::Provider;
use toolweave_tools::ToolDispatcher;
use tracing::warn;

pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    AppConfig::load_with(path).context("Failed to load config")
}

/// Start every enabled tool provider. Provider start-up blocks, so it runs
/// off the async workers.
pub async fn start_dispatcher(config: &AppConfig) -> anyhow::Result<Arc<ToolDispatcher>> {
    let servers = config.mcp_servers.clone();
    let batch = config.agent.batch_tool;
    let dispatcher = tokio::task::spawn_blocking(move || ToolDispatcher::from_servers(&servers).with_batch(batch))
        .await
        .context("Tool provider start-up panicked")?;
    Ok(Arc::new(dispatcher))
}

/// Stop every tool provider, waiting for bounded shutdown off the async
/// workers.
pub async fn stop_dispatcher(dispatcher: Arc<ToolDispatcher>) {
    if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await {
        warn!(error = %e, "Tool provider shutdown panicked");
    }
}

/// Config, model provider and tool dispatcher for commands that talk to the
/// model.
pub struct Runtime {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub dispatcher: Arc<ToolDispatcher>,
}

impl Runtime {
    pub async fn start(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;
        if !config.has_api_key() {
            warn!(
                base_url = %config.model.base_url,
                "No API key configured; set TOOLWEAVE_API_KEY or OPENAI_API_KEY unless the endpoint needs none"
            );
        }
        let provider = toolweave_providers::build_from_config(&config.model);
        let dispatcher = start_dispatcher(&config).await?;
        Ok(Self {
            config,
            provider,
            dispatcher,
        })
    }

    pub async fn shutdown(self) {
        stop_dispatcher(self.dispatcher).await;
    }
}
