//! `toolweave secretary`: run the configured prompt on a fixed interval.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolweave_agent::{AgentSession, MessageContext, Termination};
use tracing::{info, warn};

use super::Runtime;

pub async fn run(config_path: Option<&Path>, interval: Option<u64>, once: bool) -> anyhow::Result<()> {
    let runtime = Runtime::start(config_path).await?;
    let settings = runtime.config.secretary.clone();
    let interval = Duration::from_secs(interval.unwrap_or(settings.poll_interval_secs).max(1));
    let backoff = Duration::from_secs(settings.error_backoff_secs);

    let mut session = AgentSession::new(
        Arc::clone(&runtime.provider),
        Arc::clone(&runtime.dispatcher),
        &runtime.config,
    );

    info!(interval_secs = interval.as_secs(), "Secretary started");
    let mut tick = 0u64;
    loop {
        tick += 1;
        let pause = match session.process_message(&settings.prompt, Some(&MessageContext::now())).await {
            Ok(reply) if reply.termination == Termination::Degraded => {
                warn!(tick, answer = %reply.answer, "Secretary tick could not reach the model");
                backoff
            }
            Ok(reply) => {
                println!("[{}] tick {tick}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
                println!("{}", reply.text);
                println!();
                interval
            }
            Err(e) => {
                warn!(tick, error = %e, "Secretary tick failed");
                backoff
            }
        };

        if once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping secretary");
                break;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
