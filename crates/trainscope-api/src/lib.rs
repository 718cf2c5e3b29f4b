//! Trainscope training API
//!
//! Types and client for the training-job backend that trainscope monitors.
//!
//! # Overview
//!
//! - [`ModelEntity`] describes one training run and its job states
//! - [`JobData`] and [`Summary`] carry the per-step scalar and image values
//! - [`TrainingApi`] is the async interface the monitor depends on
//! - [`HttpTrainingApi`] implements it over HTTP with `reqwest`
//!
//! # Example
//!
//! ```ignore
//! use trainscope_api::{Channel, HttpApiConfig, HttpTrainingApi, JobId, TrainingApi};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = HttpTrainingApi::new(HttpApiConfig::new("https://fmltc.example.com"))?;
//!     let job = JobId::new("0f1e2d3c");
//!
//!     let response = api.fetch_summaries(&job, Channel::Scalars).await?;
//!     println!("training token: {}", response.training_updated);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod model;
pub mod summary;

pub use api::TrainingApi;
pub use error::{ApiError, ApiResult};
pub use http::{HttpApiConfig, HttpTrainingApi};
pub use model::{DatasetEntity, JobId, JobState, ModelEntity};
pub use summary::{
    CancelResponse, Channel, ImageRef, JobData, SummariesResponse, Summary, SummaryValue,
};
