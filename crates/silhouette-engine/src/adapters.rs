use serde_json::{Map, Value};
use silhouette_contracts::jobs::GenerationRequest;
use silhouette_contracts::models::ModelSpec;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::PredictionApi;
use crate::credential::Credential;
use crate::error::{JobError, Result};
use crate::poll::{poll_until_terminal, CompletedJob};

/// Whether an adapter surfaces upstream failures or settles for a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub propagate_failure: bool,
}

impl FailurePolicy {
    pub const PROPAGATE: Self = Self {
        propagate_failure: true,
    };
    pub const DEGRADE: Self = Self {
        propagate_failure: false,
    };

    pub fn for_model(spec: &ModelSpec) -> Self {
        Self {
            propagate_failure: spec.propagate_failure,
        }
    }

    /// Replaces upstream failures with `fallback` unless the policy
    /// propagates. Caller-side errors and cancellation always pass through.
    pub fn settle<T>(
        &self,
        result: Result<T>,
        fallback: impl FnOnce(&JobError) -> T,
    ) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if self.propagate_failure || !err.is_upstream() => Err(err),
            Err(err) => Ok(fallback(&err)),
        }
    }
}

/// Submits one prediction for a model and waits for its artifact.
pub struct PredictionAdapter<'a> {
    api: &'a dyn PredictionApi,
    spec: &'a ModelSpec,
}

impl<'a> PredictionAdapter<'a> {
    pub fn new(api: &'a dyn PredictionApi, spec: &'a ModelSpec) -> Self {
        Self { api, spec }
    }

    pub async fn run(
        &self,
        credential: &Credential,
        inputs: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<CompletedJob> {
        let request = GenerationRequest::for_model(self.spec, inputs).ok_or_else(|| {
            JobError::configuration(format!(
                "model '{}' has no version or model reference",
                self.spec.name
            ))
        })?;
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(JobError::Cancelled { id: format!("{} (unsubmitted)", self.spec.name) });
            }
            created = self.api.create(credential, &request, self.spec.prefer_wait) => created?,
        };
        info!(
            prediction_id = %submitted.id,
            model = %self.spec.name,
            status = %submitted.status,
            "prediction created"
        );
        poll_until_terminal(self.api, credential, submitted, self.spec.poll, cancel).await
    }
}
