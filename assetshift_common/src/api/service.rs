use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::state::APIState;

use super::{
    resolve::post_resolve,
    rewrite::{post_classify, post_rewrite},
};

pub fn service(state: Arc<APIState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/rewrite", post(post_rewrite))
        .route("/classify", post(post_classify))
        .route("/resolve", post(post_resolve))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index(State(state): State<Arc<APIState>>) -> impl IntoResponse {
    let rewrite_config = &state.rewrite_config;

    (
        StatusCode::OK,
        Json(json!({
            "active": rewrite_config.is_active(),
            "activation": rewrite_config.activation().as_str(),
            "origin_url": rewrite_config.origin_url(),
            "cdn_base_url": rewrite_config.cdn_base_url(),
            "upstream": state.config.upstream,
        })),
    )
}
