use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::multipart::Form;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use silhouette_contracts::models::ModelSpec;
use silhouette_contracts::providers::NamedProvider;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{FailurePolicy, PredictionAdapter};
use crate::client::{response_json_or_error, truncate_text, PredictionApi};
use crate::credential::Credential;
use crate::error::{JobError, Result};

pub const DEFAULT_BRIA_API_URL: &str = "https://engine.prod.bria-api.com/v1/background/remove";
pub const DEFAULT_REMOVE_BG_API_URL: &str = "https://api.remove.bg/v1.0/removebg";

/// A transparent-background image produced by a remover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub url: String,
    pub prediction_id: Option<String>,
}

/// What the background-removal operation hands back to callers. On a
/// degraded failure `transparent_image_url` is the input image itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub transparent_image_url: String,
    pub warning: Option<String>,
    pub prediction_id: Option<String>,
}

#[async_trait]
pub trait BackgroundRemover: NamedProvider + Send + Sync {
    /// Replicate-hosted removers authenticate with the caller's token.
    fn needs_credential(&self) -> bool {
        false
    }

    fn policy(&self) -> FailurePolicy;

    async fn remove(
        &self,
        image_url: &str,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Removal>;
}

/// Runs `remover` and applies its failure policy.
pub async fn remove_background(
    remover: &dyn BackgroundRemover,
    image_url: &str,
    credential: Option<&Credential>,
    cancel: &CancellationToken,
) -> Result<RemovalOutcome> {
    let attempt = remover
        .remove(image_url, credential, cancel)
        .await
        .map(|removal| RemovalOutcome {
            transparent_image_url: removal.url,
            warning: None,
            prediction_id: removal.prediction_id,
        });
    remover.policy().settle(attempt, |err| {
        warn!(
            remover = remover.name(),
            kind = err.kind(),
            error = %err,
            "background removal degraded to the original image"
        );
        RemovalOutcome {
            transparent_image_url: image_url.to_string(),
            warning: Some(degraded_warning(err).to_string()),
            prediction_id: None,
        }
    })
}

fn degraded_warning(err: &JobError) -> &'static str {
    match err {
        JobError::UpstreamJobFailure { .. } => {
            "Background removal failed; returning the original image."
        }
        JobError::UpstreamTimeout { .. } => {
            "Background removal timed out; returning the original image."
        }
        JobError::ResultMissing { .. } => {
            "Background removal returned no image; returning the original image."
        }
        _ => "Background removal service is unavailable; returning the original image.",
    }
}

fn cancelled(remover: &str) -> JobError {
    JobError::Cancelled {
        id: format!("{remover} background removal"),
    }
}

pub struct ReplicateRemover {
    api: Arc<dyn PredictionApi>,
    spec: ModelSpec,
}

impl ReplicateRemover {
    pub fn new(api: Arc<dyn PredictionApi>, spec: ModelSpec) -> Self {
        Self { api, spec }
    }
}

impl NamedProvider for ReplicateRemover {
    fn name(&self) -> &str {
        &self.spec.name
    }
}

#[async_trait]
impl BackgroundRemover for ReplicateRemover {
    fn needs_credential(&self) -> bool {
        true
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::for_model(&self.spec)
    }

    async fn remove(
        &self,
        image_url: &str,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Removal> {
        let credential = credential.ok_or_else(|| {
            JobError::configuration(format!("{} needs a Replicate API token", self.spec.name))
        })?;
        let mut inputs = Map::new();
        inputs.insert("image".to_string(), Value::String(image_url.to_string()));
        let completed = PredictionAdapter::new(self.api.as_ref(), &self.spec)
            .run(credential, inputs, cancel)
            .await?;
        Ok(Removal {
            url: completed.url,
            prediction_id: Some(completed.job.id),
        })
    }
}

/// BRIA takes the image inline, so the source is downloaded first.
pub struct BriaRemover {
    spec: ModelSpec,
    endpoint: String,
    api_key: String,
    http: HttpClient,
}

impl BriaRemover {
    pub fn new(spec: ModelSpec, endpoint: &str, api_key: &str, http: HttpClient) -> Self {
        Self {
            spec,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.trim().to_string(),
            http,
        }
    }

    async fn download(&self, image_url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(|err| JobError::transport("image download", err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::UpstreamRequest {
                provider: "image download".to_string(),
                status: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| JobError::transport("image download", err))?;
        Ok(bytes.to_vec())
    }

    async fn remove_inline(&self, image_url: &str) -> Result<Removal> {
        let image = self.download(image_url).await?;
        debug!(bytes = image.len(), "downloaded source image for BRIA");
        let mut body = json!({ "file": BASE64.encode(&image) });
        if let Some(object) = body.as_object_mut() {
            for (key, value) in &self.spec.default_inputs {
                object.insert(key.clone(), value.clone());
            }
        }
        let response = self
            .http
            .post(&self.endpoint)
            .header("api_token", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| JobError::transport("BRIA", err))?;
        let payload = response_json_or_error("BRIA", response).await?;
        let url = payload
            .get("result_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| JobError::ResultMissing {
                id: "bria".to_string(),
            })?;
        info!(remover = %self.spec.name, %url, "background removed");
        Ok(Removal {
            url: url.to_string(),
            prediction_id: None,
        })
    }
}

impl NamedProvider for BriaRemover {
    fn name(&self) -> &str {
        &self.spec.name
    }
}

#[async_trait]
impl BackgroundRemover for BriaRemover {
    fn policy(&self) -> FailurePolicy {
        FailurePolicy::for_model(&self.spec)
    }

    async fn remove(
        &self,
        image_url: &str,
        _credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Removal> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(&self.spec.name)),
            removal = self.remove_inline(image_url) => removal,
        }
    }
}

/// Remove.bg answers with image bytes, surfaced as a `data:` URL.
pub struct RemoveBgRemover {
    spec: ModelSpec,
    endpoint: String,
    api_key: String,
    http: HttpClient,
}

impl RemoveBgRemover {
    pub fn new(spec: ModelSpec, endpoint: &str, api_key: &str, http: HttpClient) -> Self {
        Self {
            spec,
            endpoint: endpoint.trim().to_string(),
            api_key: api_key.trim().to_string(),
            http,
        }
    }

    fn form(&self, image_url: &str) -> Form {
        let mut form = Form::new().text("image_url", image_url.to_string());
        for (key, value) in &self.spec.default_inputs {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            form = form.text(key.clone(), text);
        }
        form
    }

    fn image_format(&self) -> &str {
        self.spec
            .default_inputs
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("png")
    }

    async fn remove_remote(&self, image_url: &str) -> Result<Removal> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .multipart(self.form(image_url))
            .send()
            .await
            .map_err(|err| JobError::transport("Remove.bg", err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::UpstreamRequest {
                provider: "Remove.bg".to_string(),
                status: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| JobError::transport("Remove.bg", err))?;
        if bytes.is_empty() {
            return Err(JobError::ResultMissing {
                id: "remove-bg".to_string(),
            });
        }
        info!(remover = %self.spec.name, bytes = bytes.len(), "background removed");
        Ok(Removal {
            url: format!(
                "data:image/{};base64,{}",
                self.image_format(),
                BASE64.encode(&bytes)
            ),
            prediction_id: None,
        })
    }
}

impl NamedProvider for RemoveBgRemover {
    fn name(&self) -> &str {
        &self.spec.name
    }
}

#[async_trait]
impl BackgroundRemover for RemoveBgRemover {
    fn policy(&self) -> FailurePolicy {
        FailurePolicy::for_model(&self.spec)
    }

    async fn remove(
        &self,
        image_url: &str,
        _credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Removal> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(&self.spec.name)),
            removal = self.remove_remote(image_url) => removal,
        }
    }
}
