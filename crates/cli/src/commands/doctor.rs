//! `toolweave doctor`: diagnose model and tool provider health.

use std::path::Path;
use toolweave_bridge::{BridgeSpec, ToolProviderBridge};
use toolweave_config::AppConfig;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("toolweave doctor");
    println!("================\n");

    let mut issues = 0;

    let path = config_path.map_or_else(AppConfig::resolve_path, Path::to_path_buf);
    if !path.exists() {
        println!("  [warn] No config file at {}, using defaults", path.display());
        issues += 1;
    }

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 issue found. Fix the config file first.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  [ok]   API key configured");
    } else {
        println!("  [warn] No API key (set TOOLWEAVE_API_KEY or OPENAI_API_KEY)");
        issues += 1;
    }

    let provider = toolweave_providers::build_from_config(&config.model);
    match provider.health_check().await {
        Ok(true) => {
            println!("  [ok]   Model endpoint reachable: {}", config.model.base_url);
            match provider.list_models().await {
                Ok(models) if models.iter().any(|m| *m == config.model.name) => {
                    println!("  [ok]   Model '{}' available", config.model.name);
                }
                Ok(models) if !models.is_empty() => {
                    println!(
                        "  [warn] Model '{}' not in the {} models listed by the endpoint",
                        config.model.name,
                        models.len()
                    );
                    issues += 1;
                }
                Ok(_) => println!("  [ok]   Endpoint lists no models, skipping model check"),
                Err(e) => println!("  [warn] Could not list models: {e}"),
            }
        }
        Ok(false) => {
            println!("  [fail] Model endpoint unhealthy: {}", config.model.base_url);
            issues += 1;
        }
        Err(e) => {
            println!("  [fail] Model endpoint unreachable: {e}");
            issues += 1;
        }
    }

    for (name, server) in config.mcp_servers.iter() {
        if !server.is_enabled() {
            println!("  [skip] Provider '{name}' disabled");
            continue;
        }
        let name = name.to_string();
        let server = server.clone();
        let check = tokio::task::spawn_blocking(move || {
            let bridge = BridgeSpec::from_server(&name, &server).and_then(ToolProviderBridge::connect)?;
            let tools = bridge.list_tools();
            bridge.stop();
            tools.map(|t| (name, t.len()))
        })
        .await?;
        match check {
            Ok((name, count)) => println!("  [ok]   Provider '{name}' started, {count} tools"),
            Err(e) => {
                println!("  [fail] {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
