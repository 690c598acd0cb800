use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use specialist_cell::router::specialist_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Consulta API is running!" }))
        .nest("/specialists", specialist_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
}
