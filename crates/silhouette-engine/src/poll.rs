use silhouette_contracts::jobs::{Job, JobStatus};
use silhouette_contracts::models::PollPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::PredictionApi;
use crate::credential::Credential;
use crate::error::{JobError, Result};

/// A job that reached `succeeded` with a usable artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub job: Job,
    pub url: String,
    pub attempts: u32,
}

/// Re-fetches `initial` until it is terminal, the attempt bound is spent,
/// or `cancel` fires.
///
/// A job that is already terminal costs no status checks. Otherwise each
/// attempt sleeps `policy.interval()` and then fetches, so a job that never
/// settles is reported as timed out after exactly `policy.max_attempts`
/// fetches.
pub async fn poll_until_terminal(
    api: &dyn PredictionApi,
    credential: &Credential,
    initial: Job,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<CompletedJob> {
    let id = initial.id.clone();
    let mut job = initial;
    let mut attempts = 0u32;

    loop {
        let status = job.status.clone();
        match status {
            JobStatus::Succeeded => {
                let Some(url) = job.first_artifact_url() else {
                    warn!(prediction_id = %id, "prediction succeeded without output");
                    return Err(JobError::ResultMissing { id });
                };
                info!(prediction_id = %id, attempts, %url, "prediction succeeded");
                return Ok(CompletedJob { job, url, attempts });
            }
            JobStatus::Failed | JobStatus::Canceled => {
                let detail = job
                    .error_detail()
                    .unwrap_or_else(|| format!("Prediction {status} without error detail"));
                warn!(prediction_id = %id, attempts, %detail, "prediction failed");
                return Err(JobError::UpstreamJobFailure { id, detail });
            }
            _ => {}
        }

        if attempts >= policy.max_attempts {
            warn!(prediction_id = %id, attempts, last_status = %status, "prediction polling timed out");
            return Err(JobError::UpstreamTimeout { id, attempts });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled { id }),
            _ = tokio::time::sleep(policy.interval()) => {}
        }
        job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled { id }),
            fetched = api.get(credential, &id) => fetched?,
        };
        attempts += 1;
        debug!(
            prediction_id = %id,
            attempt = attempts,
            max_attempts = policy.max_attempts,
            status = %job.status,
            "polled prediction"
        );
    }
}
