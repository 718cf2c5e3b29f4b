//! The training backend interface.
//!
//! | Method | Endpoint | Returns |
//! |--------|----------|---------|
//! | `fetch_summaries()` | `POST /retrieveTrainingSummaries` | `ApiResult<SummariesResponse>` |
//! | `cancel_job()` | `POST /cancelTrainingModel` | `ApiResult<ModelEntity>` |
//! | `fetch_image_bytes()` | `GET <image_url>` | `ApiResult<Vec<u8>>` |

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::model::{JobId, ModelEntity};
use crate::summary::{Channel, SummariesResponse};

/// Trait for training-job backends.
///
/// Implementations MUST be cheap to share (`Send + Sync`); the monitor
/// issues overlapping requests from spawned tasks.
#[async_trait]
pub trait TrainingApi: Send + Sync {
    /// Fetch the latest summaries for one channel.
    ///
    /// The response always carries a fresh model entity snapshot.
    async fn fetch_summaries(&self, job_id: &JobId, channel: Channel)
    -> ApiResult<SummariesResponse>;

    /// Request cancellation of the training run.
    ///
    /// Returns the updated entity. Cancellation is asynchronous on the
    /// backend, so the entity is not necessarily terminal yet.
    async fn cancel_job(&self, job_id: &JobId) -> ApiResult<ModelEntity>;

    /// Fetch raw image bytes.
    async fn fetch_image_bytes(&self, url: &str) -> ApiResult<Vec<u8>>;
}
