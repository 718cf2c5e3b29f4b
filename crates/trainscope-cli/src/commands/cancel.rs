//! Cancel command implementation.

use anyhow::{Context, Result};
use console::style;

use trainscope_api::{JobId, TrainingApi};

use super::common::{connect, print_states};
use crate::config::Settings;

/// Execute the cancel command.
pub async fn execute(settings: &Settings, model: &str) -> Result<()> {
    let api = connect(settings)?;

    println!(
        "{} Requesting cancellation of {}",
        style("→").cyan().bold(),
        style(model).dim()
    );

    let entity = api
        .cancel_job(&JobId::new(model))
        .await
        .with_context(|| format!("Failed to cancel training run {model}"))?;

    if entity.is_training_done() {
        println!("{} Training already finished", style("✓").green().bold());
    } else {
        println!("{} Cancellation requested", style("✓").green().bold());
    }
    print_states(&entity);
    Ok(())
}
