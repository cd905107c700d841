use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_ATTEMPTS: u32 = 3;
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiseasePrediction {
    #[serde(default = "unknown_label")]
    pub label: String,
    #[serde(default)]
    pub score: f64,
}

fn unknown_label() -> String {
    UNKNOWN_LABEL.to_string()
}

impl DiseasePrediction {
    /// Placeholder used when the provider gave nothing usable.
    pub fn unknown() -> Self {
        DiseasePrediction {
            label: unknown_label(),
            score: 0.0,
        }
    }
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid API token")]
    InvalidToken,
}

/// Hosted plant disease classifier.
#[async_trait]
pub trait DiseaseClassifier: Send + Sync {
    /// Ranked predictions for the image at `path`, best first.
    async fn query(&self, path: &Path) -> Result<Vec<DiseasePrediction>, RemoteError>;
}

/// Client for a Hugging Face style image-classification inference endpoint.
pub struct HuggingFaceClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HuggingFaceClient {
    pub fn new(
        endpoint: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let mut header_map = HeaderMap::new();
        if let Some(token) = token {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::InvalidToken)?;
            auth_value.set_sensitive(true);
            header_map.insert(AUTHORIZATION, auth_value);
        }
        header_map.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .timeout(timeout)
            .build()?;

        Ok(HuggingFaceClient {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl DiseaseClassifier for HuggingFaceClient {
    async fn query(&self, path: &Path) -> Result<Vec<DiseasePrediction>, RemoteError> {
        let data = tokio::fs::read(path).await?;

        let predictions = self
            .client
            .post(&self.endpoint)
            .body(data)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<DiseasePrediction>>()
            .await?;

        Ok(predictions)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        RetryPolicy {
            base_delay,
            ..Default::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Asks the remote classifier for the top disease label, retrying empty or
/// failed answers. Falls back to `DiseasePrediction::unknown()` once the
/// attempts are used up.
pub async fn top_prediction(
    classifier: &dyn DiseaseClassifier,
    path: &Path,
    policy: &RetryPolicy,
) -> DiseasePrediction {
    for attempt in 1..=policy.max_attempts {
        match classifier.query(path).await {
            Ok(predictions) => {
                if let Some(top) = predictions.into_iter().next() {
                    info!(label = %top.label, score = top.score, attempt, "disease prediction received");
                    return top;
                }
                warn!(attempt, "disease classifier returned no predictions");
            }
            Err(err) => warn!(attempt, "Error querying disease classifier: {}", err),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    warn!(
        attempts = policy.max_attempts,
        "disease classifier exhausted retries, using placeholder"
    );
    DiseasePrediction::unknown()
}
