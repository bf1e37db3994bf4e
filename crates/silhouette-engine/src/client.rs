use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use silhouette_contracts::jobs::{GenerationRequest, Job};
use tracing::debug;

use crate::credential::Credential;
use crate::error::{JobError, Result};

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
const PROVIDER: &str = "Replicate";

/// Job creation and status lookup against a prediction provider.
#[async_trait]
pub trait PredictionApi: Send + Sync {
    async fn create(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
        prefer_wait: bool,
    ) -> Result<Job>;

    async fn get(&self, credential: &Credential, id: &str) -> Result<Job>;
}

pub struct ReplicateClient {
    api_base: String,
    http: HttpClient,
}

impl ReplicateClient {
    pub fn new(api_base: &str, http: HttpClient) -> Self {
        let trimmed = api_base.trim().trim_end_matches('/');
        Self {
            api_base: if trimmed.is_empty() {
                DEFAULT_REPLICATE_API_BASE.to_string()
            } else {
                trimmed.to_string()
            },
            http,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.api_base)
    }

    fn prediction_endpoint(&self, id: &str) -> String {
        format!("{}/predictions/{}", self.api_base, id)
    }
}

#[async_trait]
impl PredictionApi for ReplicateClient {
    async fn create(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
        prefer_wait: bool,
    ) -> Result<Job> {
        let endpoint = self.predictions_endpoint();
        let mut builder = self
            .http
            .post(&endpoint)
            .bearer_auth(credential.expose())
            .json(&request.payload());
        if prefer_wait {
            builder = builder.header("Prefer", "wait");
        }
        debug!(%endpoint, model = %request.model, prefer_wait, "creating prediction");
        let response = builder
            .send()
            .await
            .map_err(|err| JobError::transport(PROVIDER, err))?;
        job_or_error(response).await
    }

    async fn get(&self, credential: &Credential, id: &str) -> Result<Job> {
        let endpoint = self.prediction_endpoint(id);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(credential.expose())
            .send()
            .await
            .map_err(|err| JobError::transport(PROVIDER, err))?;
        job_or_error(response).await
    }
}

async fn job_or_error(response: HttpResponse) -> Result<Job> {
    let payload = response_json_or_error(PROVIDER, response).await?;
    serde_json::from_value(payload).map_err(|err| JobError::InvalidPayload {
        provider: PROVIDER.to_string(),
        reason: err.to_string(),
    })
}

pub(crate) async fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| JobError::transport(provider, err))?;
    if !status.is_success() {
        return Err(JobError::UpstreamRequest {
            provider: provider.to_string(),
            status: code,
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body).map_err(|err| JobError::InvalidPayload {
        provider: provider.to_string(),
        reason: format!("invalid JSON: {err}"),
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_is_normalized() {
        let client = ReplicateClient::new(" https://proxy.local/v1/ ", HttpClient::new());
        assert_eq!(client.api_base(), "https://proxy.local/v1");
        assert_eq!(
            client.prediction_endpoint("abc"),
            "https://proxy.local/v1/predictions/abc"
        );

        let fallback = ReplicateClient::new("", HttpClient::new());
        assert_eq!(fallback.api_base(), DEFAULT_REPLICATE_API_BASE);
    }

    #[test]
    fn truncate_text_marks_cut_bodies() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
