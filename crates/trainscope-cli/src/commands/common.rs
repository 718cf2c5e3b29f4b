//! Shared helpers for CLI commands.

use anyhow::{Context, Result};
use console::style;

use trainscope_api::{HttpTrainingApi, ModelEntity};
use trainscope_monitor::format::format_job_state;

use crate::config::Settings;

/// Build the HTTP client for the configured backend.
pub fn connect(settings: &Settings) -> Result<HttpTrainingApi> {
    HttpTrainingApi::new(settings.http_config())
        .with_context(|| format!("Failed to set up client for {}", settings.endpoint))
}

/// Print the train and eval state of a run.
pub fn print_states(entity: &ModelEntity) {
    println!(
        "  Training:   {}",
        style(format_job_state(entity.cancel_requested, entity.train_job_state)).yellow()
    );
    println!(
        "  Evaluation: {}",
        style(format_job_state(entity.cancel_requested, entity.eval_job_state)).yellow()
    );
}
