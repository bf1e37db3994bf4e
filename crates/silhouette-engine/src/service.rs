mod error;
mod routes;
mod schemas;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::service::routes::api_routes;
use crate::service::state::ServiceState;
use crate::studio::Studio;

pub use error::ApiError;
pub use schemas::{
    ErrorBody, GenerateBody, GenerateResponse, RemoveBackgroundBody, RemoveBackgroundResponse,
    SilhouetteBody, SilhouetteResponse,
};

pub fn router(studio: Arc<Studio>) -> Router {
    Router::new()
        .merge(api_routes())
        .with_state(Arc::new(ServiceState::new(studio)))
}

/// Serves the API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    studio: Arc<Studio>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "silhouette service listening");
    axum::serve(listener, router(studio))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("silhouette service stopped unexpectedly")?;
    info!("silhouette service stopped");
    Ok(())
}
