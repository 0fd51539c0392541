//! Config commands
//!
//! Commands for inspecting the resolved CLI configuration.

use anyhow::Result;
use botsync_core::config::{
    DEFAULT_API_URL, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_SECONDS, ENV_API_TOKEN,
    ENV_API_URL, ENV_CHATBOT_ID, ENV_TIMEOUT_SECS,
};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_error, print_output};
use super::Context;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
}

/// Config row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

pub async fn execute(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let rows = get_all_config(ctx);
    print_output(&rows, ctx.format)?;

    if let Err(e) = ctx.api.validate() {
        print_error(&e.to_string());
    }
    Ok(())
}

fn get_all_config(ctx: &Context) -> Vec<ConfigRow> {
    let api = &ctx.api;
    let timeout = api.timeout_seconds.to_string();
    let interval = ctx.tracker.poll_interval_ms.to_string();

    vec![
        ConfigRow {
            key: "api_url".to_string(),
            value: api.base_url.clone(),
            source: source_of(Some(ENV_API_URL), &api.base_url, DEFAULT_API_URL).to_string(),
        },
        ConfigRow {
            key: "chatbot_id".to_string(),
            value: if api.chatbot_id.is_empty() {
                "-".to_string()
            } else {
                api.chatbot_id.clone()
            },
            source: source_of(Some(ENV_CHATBOT_ID), &api.chatbot_id, "").to_string(),
        },
        ConfigRow {
            key: "api_token".to_string(),
            value: mask_token(&api.token),
            source: source_of(
                Some(ENV_API_TOKEN),
                api.token.as_deref().unwrap_or_default(),
                "",
            )
            .to_string(),
        },
        ConfigRow {
            key: "timeout_seconds".to_string(),
            value: timeout.clone(),
            source: source_of(
                Some(ENV_TIMEOUT_SECS),
                &timeout,
                &DEFAULT_TIMEOUT_SECONDS.to_string(),
            )
            .to_string(),
        },
        ConfigRow {
            key: "poll_interval_ms".to_string(),
            value: interval.clone(),
            source: source_of(None, &interval, &DEFAULT_POLL_INTERVAL_MS.to_string()).to_string(),
        },
    ]
}

/// Where a resolved value came from: `env`, `flag` or `default`
fn source_of(env_key: Option<&str>, value: &str, default: &str) -> &'static str {
    if let Some(key) = env_key {
        if std::env::var(key).is_ok_and(|v| v.trim() == value.trim()) && !value.is_empty() {
            return "env";
        }
    }
    if value == default {
        "default"
    } else {
        "flag"
    }
}

fn mask_token(token: &Option<String>) -> String {
    match token {
        Some(t) if !t.is_empty() => "****".to_string(),
        _ => "-".to_string(),
    }
}
