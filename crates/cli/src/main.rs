//! toolweave CLI, the main entry point.
//!
//! Commands:
//! - `chat`       Interactive chat or single-message mode
//! - `tools`      List the tools every provider exposes
//! - `call`       Invoke one tool directly
//! - `secretary`  Run a fixed prompt on an interval
//! - `status`     Show configuration and tool routing
//! - `doctor`     Diagnose model and provider health
//! - `config`     Show, locate or create the config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolweave",
    about = "toolweave: tool-calling orchestration for chat models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (TOML, or JSON in the mcpServers layout)
    #[arg(short, long, global = true, env = "TOOLWEAVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print each round and tool call as it happens
        #[arg(long)]
        steps: bool,
    },

    /// List discovered tools with their services
    Tools,

    /// Call one tool with JSON arguments
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Run the configured prompt on a fixed interval until Ctrl-C
    Secretary {
        /// Override the polling interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },

    /// Show configuration and tool routing
    Status,

    /// Diagnose model and tool provider health
    Doctor,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path in effect
    Path,
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Chat { message, steps } => commands::chat::run(config, message, steps).await,
        Commands::Tools => commands::tools::run(config).await,
        Commands::Call { tool, args } => commands::call::run(config, &tool, &args).await,
        Commands::Secretary { interval, once } => commands::secretary::run(config, interval, once).await,
        Commands::Status => commands::status::run(config).await,
        Commands::Doctor => commands::doctor::run(config).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config),
            ConfigAction::Path => commands::config_cmd::path(config),
            ConfigAction::Init { force } => commands::config_cmd::init(config, force),
        },
    }
}
