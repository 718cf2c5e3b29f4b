//! Model entity types.
//!
//! The backend owns a [`ModelEntity`] per training run. Every summaries
//! response and every cancel response carries a full snapshot, which
//! replaces the cached copy wholesale.
//!
//! # Job state machine
//!
//! ```text
//!   QUEUED ──→ PREPARING ──→ RUNNING ──→ SUCCEEDED
//!                               │
//!                               ├──→ FAILED
//!                               │
//!                               └──→ CANCELLING ──→ CANCELLED
//! ```
//!
//! Terminal states (`SUCCEEDED`, `FAILED`, `CANCELLED`) are permanent.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a training run (the model UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// State of a backend training or eval job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// No state reported yet.
    #[default]
    StateUnspecified,
    /// Waiting for resources.
    Queued,
    /// Resources allocated, job starting.
    Preparing,
    /// Job is running.
    Running,
    /// Job finished successfully.
    Succeeded,
    /// Job failed.
    Failed,
    /// Cancellation in progress.
    Cancelling,
    /// Job was cancelled.
    Cancelled,
    /// A state string this client does not know.
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Check if the job has not reported any state.
    pub fn is_unspecified(&self) -> bool {
        matches!(self, JobState::StateUnspecified)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::StateUnspecified => "Not started",
            JobState::Queued => "Queued",
            JobState::Preparing => "Preparing",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
            JobState::Cancelling => "Cancelling",
            JobState::Cancelled => "Cancelled",
            JobState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Snapshot of a training run as reported by the backend.
///
/// Numeric and timestamp fields decode leniently: a malformed value falls
/// back to its default rather than failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEntity {
    pub model_uuid: String,
    pub description: String,
    /// Creation time, milliseconds since the Unix epoch.
    #[serde(deserialize_with = "lenient::millis")]
    pub create_time_ms: i64,
    pub original_starting_model: String,
    pub starting_model: String,
    pub user_visible_starting_model: String,
    pub dataset_uuids: Vec<String>,
    /// Training steps accumulated across the model's lineage.
    #[serde(deserialize_with = "lenient::count")]
    pub total_training_steps: u64,
    /// Steps configured for this run.
    #[serde(deserialize_with = "lenient::count")]
    pub num_training_steps: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub train_frame_count: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub train_negative_frame_count: u64,
    #[serde(deserialize_with = "lenient::label_counts")]
    pub train_dict_label_to_count: BTreeMap<String, u64>,
    #[serde(deserialize_with = "lenient::count")]
    pub eval_frame_count: u64,
    #[serde(deserialize_with = "lenient::count")]
    pub eval_negative_frame_count: u64,
    #[serde(deserialize_with = "lenient::label_counts")]
    pub eval_dict_label_to_count: BTreeMap<String, u64>,
    pub cancel_requested: bool,
    pub train_job_state: JobState,
    pub eval_job_state: JobState,
    /// Elapsed seconds reported by the backend, 0 while unknown.
    #[serde(deserialize_with = "lenient::seconds")]
    pub train_job_elapsed_seconds: f64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::timestamp"
    )]
    pub train_job_start_time: Option<DateTime<Utc>>,
}

impl ModelEntity {
    /// Whether training has settled and no further progress will arrive.
    ///
    /// The training job must be terminal. The eval job must be terminal
    /// too, unless it never reported a state.
    pub fn is_training_done(&self) -> bool {
        self.train_job_state.is_terminal()
            && (self.eval_job_state.is_terminal() || self.eval_job_state.is_unspecified())
    }

    /// Whether this run was started from a previously trained model.
    pub fn has_previous_model(&self) -> bool {
        !self.starting_model.is_empty() && self.original_starting_model != self.starting_model
    }

    /// Creation time as a UTC timestamp.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.create_time_ms)
    }
}

/// A dataset referenced by a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetEntity {
    pub dataset_uuid: String,
    pub description: String,
}

/// Field decoders for [`ModelEntity`] that map malformed values to the
/// field's default.
mod lenient {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use tracing::warn;

    fn decode<'de, D, T>(deserializer: D, parse: fn(&Value) -> Option<T>) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(T::default());
        }
        Ok(parse(&value).unwrap_or_else(|| {
            warn!(%value, "Ignoring malformed model entity field");
            T::default()
        }))
    }

    fn number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.filter(|f| f.is_finite())
    }

    fn whole(value: &Value) -> Option<f64> {
        number(value).filter(|f| f.fract() == 0.0)
    }

    fn as_count(value: &Value) -> Option<u64> {
        value.as_u64().or_else(|| {
            whole(value)
                .filter(|f| *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        })
    }

    pub(super) fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        decode(deserializer, as_count)
    }

    pub(super) fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        decode(deserializer, |value| {
            value.as_i64().or_else(|| {
                whole(value)
                    .filter(|f| *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                    .map(|f| f as i64)
            })
        })
    }

    pub(super) fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        decode(deserializer, number)
    }

    pub(super) fn timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        decode(deserializer, |value| {
            let text = value.as_str()?;
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|time| Some(time.with_timezone(&Utc)))
        })
    }

    pub(super) fn label_counts<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, u64>, D::Error> {
        decode(deserializer, |value| {
            let entries = value.as_object()?;
            Some(
                entries
                    .iter()
                    .filter_map(|(label, count)| Some((label.clone(), as_count(count)?)))
                    .collect(),
            )
        })
    }
}
