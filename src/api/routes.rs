//! Router assembly and middleware wiring

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::{AuthLayer, RateLimitLayer};
use crate::AppState;

/// Build the application router with middleware applied per settings
pub async fn create_router(state: Arc<AppState>) -> Router {
    let (auth, rate_limit) = {
        let settings = state.settings.read().await;
        (settings.auth.clone(), settings.rate_limit.clone())
    };

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/generate/txt2img", post(handlers::generate_txt2img))
        .route("/generate/img2img", post(handlers::generate_img2img))
        .route("/generate/controlnet", post(handlers::generate_controlnet))
        .route("/generate/regional", post(handlers::generate_regional))
        .route("/jobs/:job_id", get(handlers::job_status))
        .route("/jobs/:job_id/position", get(handlers::job_position))
        .route("/jobs/:job_id/result", get(handlers::job_result))
        .route("/sessions/:caller_id", get(handlers::get_session))
        .route(
            "/sessions/:caller_id/modifiers",
            post(handlers::add_modifier).delete(handlers::clear_modifiers),
        )
        .route(
            "/sessions/:caller_id/modifiers/:name",
            delete(handlers::remove_modifier),
        )
        .route(
            "/presets/:caller_id",
            get(handlers::list_presets).post(handlers::save_preset),
        )
        .route(
            "/presets/:caller_id/:preset_id",
            delete(handlers::delete_preset),
        )
        .with_state(state);

    if rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(
            rate_limit.requests_per_second,
            rate_limit.burst_size,
        ));
    }

    if auth.enabled {
        router = router.layer(AuthLayer::new(auth.api_keys));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
