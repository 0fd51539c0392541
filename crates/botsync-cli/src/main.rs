//! botsync CLI - Trigger and follow chatbot source syncs
//!
//! A command-line front end for the sync page of the chatbot console:
//! list configured Jira, Confluence and Git syncs, run one and follow its
//! job to the end, or resume following jobs that are already in flight.

mod commands;
mod output;

use anyhow::Result;
use botsync_core::config::{ApiConfig, TrackerConfig, DEFAULT_POLL_INTERVAL_MS};
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "botsync")]
#[command(author, version, about = "Chatbot source sync CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Backend API base URL (or set BOTSYNC_API_URL env var)
    #[arg(long, env = "BOTSYNC_API_URL", global = true)]
    api_url: Option<String>,

    /// Chatbot whose syncs are managed (or set BOTSYNC_CHATBOT_ID env var)
    #[arg(long, env = "BOTSYNC_CHATBOT_ID", global = true)]
    chatbot: Option<String>,

    /// API token (or set BOTSYNC_API_TOKEN env var)
    #[arg(long, env = "BOTSYNC_API_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds (or set BOTSYNC_TIMEOUT_SECS env var)
    #[arg(long, env = "BOTSYNC_TIMEOUT_SECS", global = true)]
    timeout: Option<u32>,

    /// Delay between two status queries of the same job
    #[arg(long, global = true, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List, run and follow syncs
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

impl Cli {
    fn api_config(&self) -> ApiConfig {
        let mut config = ApiConfig::default();
        if let Some(url) = &self.api_url {
            config.base_url = url.clone();
        }
        if let Some(chatbot) = &self.chatbot {
            config.chatbot_id = chatbot.clone();
        }
        config.token = self.token.clone().filter(|t| !t.trim().is_empty());
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
        config
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Create context for commands
    let ctx = commands::Context {
        api: cli.api_config(),
        tracker: TrackerConfig::with_interval_ms(cli.poll_interval_ms),
        format: cli.format,
        quiet: cli.quiet,
    };
    log::debug!(
        "Using API {} for chatbot {:?}",
        ctx.api.base(),
        ctx.api.chatbot_id
    );

    // Execute command
    match cli.command {
        Commands::Sync { action } => commands::sync::execute(&ctx, action).await,
        Commands::Config { action } => commands::config::execute(&ctx, action).await,
    }
}
