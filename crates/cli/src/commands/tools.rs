//! `toolweave tools`: list discovered tools grouped by service.

use std::collections::BTreeMap;
use std::path::Path;

use super::{load_config, start_dispatcher, stop_dispatcher};

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let dispatcher = start_dispatcher(&config).await?;

    let mut by_service: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for descriptor in dispatcher.descriptors() {
        by_service
            .entry(descriptor.service)
            .or_default()
            .push((descriptor.name, first_line(&descriptor.description)));
    }

    if by_service.is_empty() {
        println!("No tools available. Configure providers under [mcp_servers] in the config file.");
    }
    for (service, tools) in &by_service {
        println!("[{service}] ({} tools)", tools.len());
        for (name, description) in tools {
            if description.is_empty() {
                println!("  {name}");
            } else {
                println!("  {name}: {description}");
            }
        }
        println!();
    }

    for info in dispatcher.services() {
        let dir = info
            .working_directory
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {}: {} {} (cwd: {dir})",
            info.service_name,
            info.command,
            info.args.join(" ")
        );
    }

    stop_dispatcher(dispatcher).await;
    Ok(())
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}
