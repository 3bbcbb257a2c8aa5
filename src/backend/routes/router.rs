/**
 * Router Configuration
 * 
 * Assembles the operational routes into one router with request tracing
 * and a JSON 404 fallback.
 */

use axum::http::StatusCode;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::backend::error::BackendError;
use crate::backend::routes::ops_routes::configure_ops_routes;
use crate::backend::server::state::AppState;

pub fn create_router(app_state: AppState) -> Router<()> {
    let router = configure_ops_routes(Router::new());

    router
        .fallback(|| async { BackendError::handler(StatusCode::NOT_FOUND, "Not Found") })
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
