//! Text-generation provider implementations for toolweave.
//!
//! All providers implement the `toolweave_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;
use toolweave_config::ModelConfig;
use toolweave_core::provider::Provider;

/// Build the configured provider.
pub fn build_from_config(config: &ModelConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    Arc::new(OpenAiCompatProvider::with_timeout(
        provider_label(&config.base_url),
        &config.base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    ))
}

/// A short name for log lines, derived from the endpoint host.
pub fn provider_label(base_url: &str) -> String {
    let host = base_url
        .split("://")
        .nth(1)
        .unwrap_or(base_url)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();

    match host {
        "api.openai.com" => "openai".into(),
        "localhost" | "127.0.0.1" => "local".into(),
        "" => "custom".into(),
        other => other.to_string(),
    }
}
