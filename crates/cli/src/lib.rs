//! Client for the customer category prediction API.

use custcat_types::{missing_fields, CustomerFeatures};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

/// Base URL used when `API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "API_URL";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("request rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Body of a successful `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: u32,
    pub message: String,
    pub input_features: CustomerFeatures,
}

/// Join `base` and `endpoint` with exactly one slash.
pub fn api_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Required attributes absent from `data`, checked before any request is sent.
pub fn required_fields_missing(data: &Map<String, Value>) -> Vec<&'static str> {
    missing_fields(data)
}

/// The server's `detail` message, or a placeholder when the body has none.
pub fn error_detail(body: &Value) -> String {
    body.get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[derive(Debug, Clone)]
pub struct PredictionApi {
    base_url: String,
    client: reqwest::Client,
}

impl PredictionApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Submit one customer for classification.
    pub async fn predict(
        &self,
        data: &Map<String, Value>,
    ) -> Result<PredictionResponse, ClientError> {
        let missing = required_fields_missing(data);
        if !missing.is_empty() {
            error!("Missing required fields: {:?}", missing);
            return Err(ClientError::MissingFields(missing));
        }

        let url = api_url(&self.base_url, "predict");
        info!("Calling prediction API at {}", url);
        let response = self
            .client
            .post(&url)
            .json(data)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| ClientError::InvalidResponse {
                url: url.clone(),
                reason: err.to_string(),
            })?;
        info!("Server responded {}: {}", status, body);

        if !status.is_success() {
            let detail = error_detail(&body);
            error!("Prediction failed: {}", detail);
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        serde_json::from_value(body).map_err(|err| ClientError::InvalidResponse {
            url,
            reason: err.to_string(),
        })
    }

    /// `GET /api/test`
    pub async fn status(&self) -> Result<Value, ClientError> {
        self.get_json("api/test").await
    }

    /// `GET /`
    pub async fn info(&self) -> Result<Value, ClientError> {
        self.get_json("").await
    }

    async fn get_json(&self, endpoint: &str) -> Result<Value, ClientError> {
        let url = api_url(&self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| ClientError::InvalidResponse {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(ClientError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&body),
            })
        }
    }
}
