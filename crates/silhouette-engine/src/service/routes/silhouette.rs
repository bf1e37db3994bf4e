use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::service::error::ApiError;
use crate::service::schemas::{SilhouetteBody, SilhouetteResponse};
use crate::service::state::ServiceState;

pub async fn create_silhouette(
    State(state): State<Arc<ServiceState>>,
    body: Result<Json<SilhouetteBody>, JsonRejection>,
) -> Result<Json<SilhouetteResponse>, ApiError> {
    let Json(body) = body?;
    async move {
        let cancel = CancellationToken::new();
        let result = state.studio().silhouette(body.into(), &cancel).await?;
        info!(
            model = %result.model,
            transparent = result.artifact.transparent_image_url.is_some(),
            "silhouette finished"
        );
        Ok::<_, ApiError>(Json(SilhouetteResponse {
            prompt: result.prompt.prompt,
            negative_prompt: result.prompt.negative_prompt,
            model: result.model,
            artifact: result.artifact,
        }))
    }
    .instrument(super::request_span("/silhouettes"))
    .await
}
