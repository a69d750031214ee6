use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use crate::settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("portal answered HTTP {0}")]
    Status(u16),
    #[error("could not read response body: {0}")]
    Body(#[source] reqwest::Error),
}

impl FetchError {
    /// Rate limiting, server trouble and timeouts are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => *code == 429 || (500..600).contains(code),
            FetchError::Transport(e) => e.is_timeout() || e.is_connect(),
            FetchError::Body(_) => false,
        }
    }
}

/// Anything that can hand back the raw results page for a roll + semester.
pub trait PageSource: Send + Sync + 'static {
    fn fetch(
        &self,
        roll: &str,
        semester: &str,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Form-POST client for the grade-wise results endpoint.
pub struct Portal {
    client: reqwest::Client,
    endpoint: String,
}

impl Portal {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

impl PageSource for Portal {
    async fn fetch(&self, roll: &str, semester: &str) -> Result<String, FetchError> {
        let form = [("aadhar1", roll), ("grade2", semester), ("mode", "getData")];
        debug!(roll, semester, "POST {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(FetchError::Body)
    }
}
