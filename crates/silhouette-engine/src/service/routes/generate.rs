use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::service::error::ApiError;
use crate::service::schemas::{GenerateBody, GenerateResponse};
use crate::service::state::ServiceState;

pub async fn generate(
    State(state): State<Arc<ServiceState>>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(body) = body?;
    async move {
        let cancel = CancellationToken::new();
        let generated = state.studio().generate(body.into(), &cancel).await?;
        info!(model = %generated.model, prediction_id = %generated.prediction_id, "generate finished");
        Ok::<_, ApiError>(Json(GenerateResponse {
            image_url: generated.image_url,
            prediction_id: generated.prediction_id,
        }))
    }
    .instrument(super::request_span("/generate"))
    .await
}
