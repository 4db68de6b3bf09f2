use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::speech;
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router with protected routes
///
/// Note: Authentication middleware is applied by [`super::create_app`]
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tts/speech", post(speech::synthesize_speech))
        .route("/api/tts/voices", get(speech::list_voices))
        .route("/api/tts/health", get(speech::provider_health))
        .route("/api/tts/providers", get(speech::list_providers))
        .layer(TraceLayer::new_for_http())
}
