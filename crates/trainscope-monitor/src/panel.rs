//! Model details and control descriptors.

use chrono::{DateTime, Local, Utc};
use rustc_hash::FxHashMap;

use trainscope_api::{DatasetEntity, ModelEntity};

use crate::controller::interval_label;
use crate::format::{format_count, format_elapsed_seconds, format_job_state, seconds_since};

/// Models and datasets known to the caller, used to describe lineage.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: FxHashMap<String, ModelEntity>,
    datasets: FxHashMap<String, DatasetEntity>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: ModelEntity) -> Self {
        self.insert_model(model);
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetEntity) -> Self {
        self.insert_dataset(dataset);
        self
    }

    pub fn insert_model(&mut self, model: ModelEntity) {
        self.models.insert(model.model_uuid.clone(), model);
    }

    pub fn insert_dataset(&mut self, dataset: DatasetEntity) {
        self.datasets.insert(dataset.dataset_uuid.clone(), dataset);
    }

    pub fn model(&self, uuid: &str) -> Option<&ModelEntity> {
        self.models.get(uuid)
    }

    /// Dataset description, falling back to the uuid when unknown.
    pub fn dataset_description(&self, uuid: &str) -> String {
        self.datasets
            .get(uuid)
            .map(|d| d.description.clone())
            .unwrap_or_else(|| uuid.to_string())
    }
}

/// The model a run was continued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousModel {
    pub name: String,
    /// Formatted step count, absent when the model is not in the catalog.
    pub training_steps: Option<String>,
    pub datasets: Vec<String>,
}

/// Label and formatted count.
pub type LabelCount = (String, String);

/// Everything the model details table shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPanel {
    pub description: String,
    /// Local time string, empty when the entity has no creation time.
    pub created: String,
    pub original_model: String,
    pub previous_model: Option<PreviousModel>,
    pub added_datasets: Vec<String>,
    pub train_frame_count: String,
    pub train_negative_frame_count: String,
    pub train_label_counts: Vec<LabelCount>,
    pub num_training_steps: String,
    pub eval_frame_count: String,
    pub eval_negative_frame_count: String,
    pub eval_label_counts: Vec<LabelCount>,
    pub train_state: String,
    pub eval_state: String,
    /// Elapsed training time as reported by the backend.
    pub elapsed: Option<String>,
}

impl ModelPanel {
    pub fn build(entity: &ModelEntity, catalog: &ModelCatalog) -> Self {
        let mut added: Vec<&str> = entity.dataset_uuids.iter().map(String::as_str).collect();

        let previous_model = if entity.has_previous_model() {
            let previous = catalog.model(&entity.starting_model);
            if let Some(previous) = previous {
                added.retain(|uuid| !previous.dataset_uuids.iter().any(|p| p.as_str() == *uuid));
            }
            Some(PreviousModel {
                name: entity.user_visible_starting_model.clone(),
                training_steps: previous.map(|p| format_count(p.total_training_steps)),
                datasets: previous
                    .map(|p| {
                        p.dataset_uuids
                            .iter()
                            .map(|uuid| catalog.dataset_description(uuid))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        } else {
            None
        };

        Self {
            description: entity.description.clone(),
            created: entity
                .created_at()
                .map(format_local_time)
                .unwrap_or_default(),
            original_model: entity.original_starting_model.clone(),
            previous_model,
            added_datasets: added
                .into_iter()
                .map(|uuid| catalog.dataset_description(uuid))
                .collect(),
            train_frame_count: format_count(entity.train_frame_count),
            train_negative_frame_count: format_count(entity.train_negative_frame_count),
            train_label_counts: label_counts(&entity.train_dict_label_to_count),
            num_training_steps: format_count(entity.num_training_steps),
            eval_frame_count: format_count(entity.eval_frame_count),
            eval_negative_frame_count: format_count(entity.eval_negative_frame_count),
            eval_label_counts: label_counts(&entity.eval_dict_label_to_count),
            train_state: format_job_state(entity.cancel_requested, entity.train_job_state),
            eval_state: format_job_state(entity.cancel_requested, entity.eval_job_state),
            elapsed: (entity.train_job_elapsed_seconds > 0.0)
                .then(|| format_elapsed_seconds(entity.train_job_elapsed_seconds)),
        }
    }
}

/// Elapsed time computed locally while the backend has not reported it.
///
/// Returns `None` once the backend reports elapsed seconds, or when the
/// start time is unknown.
pub fn elapsed_display(entity: &ModelEntity, now: DateTime<Utc>) -> Option<String> {
    if entity.train_job_elapsed_seconds != 0.0 {
        return None;
    }
    let start = entity.train_job_start_time?;
    Some(format_elapsed_seconds(seconds_since(start, now)))
}

fn label_counts(counts: &std::collections::BTreeMap<String, u64>) -> Vec<LabelCount> {
    counts
        .iter()
        .map(|(label, count)| (label.clone(), format_count(*count)))
        .collect()
}

fn format_local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Enablement of the user controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub can_cancel: bool,
    pub refresh_enabled: bool,
    /// Whether the job is still running and the refresh controls apply.
    pub active: bool,
    pub interval_minutes: u32,
    pub interval_label: String,
}

impl ControlState {
    pub fn new(entity: &ModelEntity, done: bool, refresh_enabled: bool, interval_minutes: u32) -> Self {
        let done = done || entity.is_training_done();
        Self {
            can_cancel: !done && !entity.cancel_requested,
            refresh_enabled,
            active: !done,
            interval_minutes,
            interval_label: interval_label(interval_minutes),
        }
    }

    /// Controls before any model entity is known. Cancel is not offered
    /// for a job whose state is unknown.
    pub fn pending(done: bool, refresh_enabled: bool, interval_minutes: u32) -> Self {
        Self {
            can_cancel: false,
            refresh_enabled,
            active: !done,
            interval_minutes,
            interval_label: interval_label(interval_minutes),
        }
    }
}
