//! `toolweave status`: configuration summary and tool routing.

use std::collections::BTreeMap;
use std::path::Path;
use toolweave_config::AppConfig;

use super::{load_config, start_dispatcher, stop_dispatcher};

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let path = config_path.map_or_else(AppConfig::resolve_path, Path::to_path_buf);

    println!("toolweave status");
    println!("================");
    println!("  Config file:  {}", path.display());
    println!("  Model:        {}", config.model.name);
    println!("  Endpoint:     {}", config.model.base_url);
    println!("  Provider:     {}", toolweave_providers::provider_label(&config.model.base_url));
    println!("  Temperature:  {}", config.model.temperature);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Rounds:       {} per message, {} unattended", config.agent.max_rounds, config.client.max_rounds);
    println!("  Batch tool:   {}", if config.agent.batch_tool { "enabled" } else { "disabled" });
    println!(
        "  Servers:      {} configured, {} enabled",
        config.mcp_servers.len(),
        config.mcp_servers.enabled().count()
    );

    let dispatcher = start_dispatcher(&config).await?;
    let routing: BTreeMap<String, String> = dispatcher.tool_to_service_map().into_iter().collect();
    println!();
    println!("  Tool routing ({} tools):", routing.len());
    for (tool, service) in &routing {
        println!("    {tool} -> {service}");
    }
    stop_dispatcher(dispatcher).await;

    if !path.exists() {
        println!();
        println!("  No config file, run `toolweave config init` first");
    }
    Ok(())
}
