//! Training summary types.
//!
//! The backend exposes two independent subscriptions, [`Channel::Scalars`]
//! and [`Channel::Images`]. Each response carries a [`JobData`] snapshot for
//! the training job and one for the eval job, each with its own `updated`
//! change token.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::model::ModelEntity;

/// One of the two independent data subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Scalar metrics (loss, precision, learning rate, ...).
    Scalars,
    /// Sample images with predicted boxes.
    Images,
}

impl Channel {
    /// Both channels, in fetch order.
    pub const ALL: [Channel; 2] = [Channel::Scalars, Channel::Images];

    /// Whether a request for this channel asks for scalars.
    pub fn wants_scalars(self) -> bool {
        matches!(self, Channel::Scalars)
    }

    /// Whether a request for this channel asks for images.
    pub fn wants_images(self) -> bool {
        matches!(self, Channel::Images)
    }

    /// Lowercase channel name.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Scalars => "scalars",
            Channel::Images => "images",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scalars" | "scalar" => Ok(Channel::Scalars),
            "images" | "image" => Ok(Channel::Images),
            other => Err(format!("unknown channel '{other}' (expected scalars or images)")),
        }
    }
}

/// Reference to an image stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Where the image bytes can be fetched.
    pub image_url: String,
    /// Native width in pixels.
    #[serde(default)]
    pub width: u32,
    /// Native height in pixels.
    #[serde(default)]
    pub height: u32,
}

/// Value recorded for a tag at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryValue {
    /// A numeric scalar.
    Scalar(f64),
    /// An image descriptor.
    Image(ImageRef),
    /// Anything else; ignored when rendering.
    Other(serde_json::Value),
}

impl SummaryValue {
    /// The numeric value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SummaryValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The image reference, if this is an image.
    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            SummaryValue::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// All values recorded at one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub step: u64,
    #[serde(default)]
    pub values: FxHashMap<String, SummaryValue>,
}

/// Snapshot of one job's summaries for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    /// Change token; empty until the backend has produced data.
    pub updated: String,
    /// Ascending, unique steps.
    pub sorted_steps: Vec<u64>,
    /// Tags in display order.
    pub sorted_tags: Vec<String>,
    pub summaries: Vec<Summary>,
}

impl JobData {
    /// Whether the backend has produced any data for this job yet.
    pub fn has_data(&self) -> bool {
        !self.updated.is_empty()
    }
}

/// Wire response of the summaries endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummariesResponse {
    pub model_entity: ModelEntity,
    pub training_updated: String,
    pub training_sorted_tags: Vec<String>,
    pub training_sorted_steps: Vec<u64>,
    pub training_summaries: Vec<Summary>,
    pub eval_updated: String,
    pub eval_sorted_tags: Vec<String>,
    pub eval_sorted_steps: Vec<u64>,
    pub eval_summaries: Vec<Summary>,
}

impl SummariesResponse {
    /// Split the response into the entity and the training/eval snapshots.
    pub fn into_parts(self) -> (ModelEntity, JobData, JobData) {
        let training = JobData {
            updated: self.training_updated,
            sorted_steps: self.training_sorted_steps,
            sorted_tags: self.training_sorted_tags,
            summaries: self.training_summaries,
        };
        let eval = JobData {
            updated: self.eval_updated,
            sorted_steps: self.eval_sorted_steps,
            sorted_tags: self.eval_sorted_tags,
            summaries: self.eval_summaries,
        };
        (self.model_entity, training, eval)
    }
}

/// Wire response of the cancel endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub model_entity: ModelEntity,
}
