//! HTTP client for the training backend.
//!
//! Requests are form-encoded POSTs returning JSON, except image downloads
//! which are plain GETs. Relative image URLs are resolved against the
//! configured endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::TrainingApi;
use crate::error::{ApiError, ApiResult};
use crate::model::{JobId, ModelEntity};
use crate::summary::{CancelResponse, Channel, SummariesResponse};

/// Summaries endpoint path.
pub const SUMMARIES_PATH: &str = "/retrieveTrainingSummaries";

/// Cancel endpoint path.
pub const CANCEL_PATH: &str = "/cancelTrainingModel";

/// User-Agent sent with requests.
const USER_AGENT: &str = concat!("trainscope/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`HttpTrainingApi`].
#[derive(Clone)]
pub struct HttpApiConfig {
    /// Base URL of the backend, e.g. `https://fmltc.example.com`.
    pub endpoint: String,
    /// Bearer token or session value sent as `Authorization`.
    pub token: Option<String>,
    /// Total request timeout.
    pub request_timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl HttpApiConfig {
    /// Create a configuration with default timeouts.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the authentication token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the total request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for HttpApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// reqwest-backed [`TrainingApi`].
pub struct HttpTrainingApi {
    client: Client,
    base: Url,
}

impl fmt::Debug for HttpTrainingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTrainingApi")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpTrainingApi {
    /// Build a client from configuration.
    pub fn new(config: HttpApiConfig) -> ApiResult<Self> {
        let base = Url::parse(&config.endpoint).map_err(|e| ApiError::InvalidUrl {
            url: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Configuration(format!(
                "endpoint '{}' cannot be used as a base URL",
                config.endpoint
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = &config.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::Configuration("token is not a valid header value".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client, base })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a path or absolute URL against the base.
    pub fn resolve(&self, url: &str) -> ApiResult<Url> {
        self.base.join(url).map_err(|e| ApiError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> ApiResult<T> {
        let url = self.resolve(path)?;
        debug!(%url, "POST");

        let response = self.client.post(url).form(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(path, status, response).await);
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }
}

async fn status_error(endpoint: &str, status: StatusCode, response: reqwest::Response) -> ApiError {
    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("no body").to_string());
    ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    }
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[async_trait]
impl TrainingApi for HttpTrainingApi {
    async fn fetch_summaries(
        &self,
        job_id: &JobId,
        channel: Channel,
    ) -> ApiResult<SummariesResponse> {
        self.post_form(
            SUMMARIES_PATH,
            &[
                ("model_uuid", job_id.as_str()),
                ("retrieve_scalars", flag(channel.wants_scalars())),
                ("retrieve_images", flag(channel.wants_images())),
            ],
        )
        .await
    }

    async fn cancel_job(&self, job_id: &JobId) -> ApiResult<ModelEntity> {
        let response: CancelResponse = self
            .post_form(CANCEL_PATH, &[("model_uuid", job_id.as_str())])
            .await?;
        Ok(response.model_entity)
    }

    async fn fetch_image_bytes(&self, url: &str) -> ApiResult<Vec<u8>> {
        let resolved = self.resolve(url)?;
        debug!(url = %resolved, "GET image");

        let response = self.client.get(resolved).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status, response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }
}
