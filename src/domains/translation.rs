pub mod dto;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::system::locale::language_middleware;
use handlers::{add_missing, get_bundle, health, reload_bundle, translate};
use state::TranslationState;

pub fn router(state: Arc<TranslationState>) -> Router {
    let registry = Arc::clone(&state.shared_state.registry);

    Router::new()
        .route("/health", get(health))
        .route("/locales", get(get_bundle).post(add_missing))
        .route("/locales/reload", post(reload_bundle))
        .route("/translate/{key}", get(translate))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(registry, language_middleware))
        .layer(CorsLayer::permissive())
}
