use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::service::error::ApiError;
use crate::service::schemas::{RemoveBackgroundBody, RemoveBackgroundResponse};
use crate::service::state::ServiceState;

pub async fn remove_background(
    State(state): State<Arc<ServiceState>>,
    body: Result<Json<RemoveBackgroundBody>, JsonRejection>,
) -> Result<Json<RemoveBackgroundResponse>, ApiError> {
    let Json(body) = body?;
    async move {
        let cancel = CancellationToken::new();
        let outcome = state
            .studio()
            .remove_background(body.image_url.as_deref(), body.credential.as_deref(), &cancel)
            .await?;
        info!(degraded = outcome.warning.is_some(), "remove-background finished");
        Ok::<_, ApiError>(Json(RemoveBackgroundResponse {
            transparent_image_url: outcome.transparent_image_url,
            warning: outcome.warning,
            prediction_id: outcome.prediction_id,
        }))
    }
    .instrument(super::request_span("/remove-background"))
    .await
}
