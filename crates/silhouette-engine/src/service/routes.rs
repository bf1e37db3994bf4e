use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::service::error::ApiError;
use crate::service::state::ServiceState;

mod background;
mod generate;
mod silhouette;

pub fn api_routes() -> Router<Arc<ServiceState>> {
    Router::new()
        .route(
            "/generate",
            post(generate::generate).fallback(method_not_allowed),
        )
        .route(
            "/remove-background",
            post(background::remove_background).fallback(method_not_allowed),
        )
        .route(
            "/silhouettes",
            post(silhouette::create_silhouette).fallback(method_not_allowed),
        )
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn request_span(route: &'static str) -> Span {
    let request_id = Uuid::new_v4();
    info_span!("request", %request_id, route)
}
