use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        discrepancy_check, healthcheck, list_accounts, refresh_views, video_performance,
        views_status,
    },
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route(
            "/api/v1/views/refresh",
            post(refresh_views).get(views_status),
        )
        .route("/api/v1/discrepancy", get(discrepancy_check))
        .route("/api/v1/accounts", get(list_accounts))
        .route("/api/v1/video-performance", get(video_performance))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
