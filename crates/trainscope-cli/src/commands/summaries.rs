//! Summaries command implementation.
//!
//! Fetch one channel once and print the raw response as JSON.

use anyhow::{Context, Result};

use trainscope_api::{Channel, JobId, TrainingApi};

use super::common::connect;
use crate::config::Settings;

/// Execute the summaries command.
pub async fn execute(settings: &Settings, model: &str, channel: Channel) -> Result<()> {
    let api = connect(settings)?;

    let response = api
        .fetch_summaries(&JobId::new(model), channel)
        .await
        .with_context(|| format!("Failed to fetch {channel} summaries for {model}"))?;

    let json = serde_json::to_string_pretty(&response).context("Failed to encode response")?;
    println!("{json}");
    Ok(())
}
