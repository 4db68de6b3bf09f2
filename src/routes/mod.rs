pub mod api;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};

use crate::handlers;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Public liveness route plus the protected API, with state applied.
///
/// CORS, rate limiting and security headers are layered on by the binary.
pub fn create_app(state: Arc<AppState>) -> Router {
    let protected_routes = api::create_api_router()
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let public_routes = Router::new().route("/", get(handlers::api::health_check));

    public_routes.merge(protected_routes).with_state(state)
}
