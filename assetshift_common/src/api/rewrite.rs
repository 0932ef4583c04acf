use std::sync::Arc;

use axum::debug_handler;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rewriting::{classify, rewrite_with_report, Classification};
use crate::state::APIState;

#[derive(Deserialize)]
pub struct RewriteRequest {
    pub html: String,
}

#[derive(Serialize)]
pub struct RewriteResponse {
    pub html: String,
    pub candidates: usize,
    pub rewritten: usize,
}

#[derive(Deserialize)]
pub struct ClassifyRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct ClassifyResponse {
    pub eligible: bool,
    pub replacement: Option<String>,
    /// Why the URL is left alone, `null` when it is eligible
    pub reason: Option<&'static str>,
}

#[debug_handler]
pub async fn post_rewrite(
    State(state): State<Arc<APIState>>,
    Json(RewriteRequest { html }): Json<RewriteRequest>,
) -> Result<Json<RewriteResponse>> {
    let report = rewrite_with_report(&html, &state.rewrite_config);

    Ok(Json(RewriteResponse {
        html: report.document,
        candidates: report.candidates,
        rewritten: report.rewritten,
    }))
}

/// Classifies a single URL. This ignores activation so a misconfigured key can still
/// be debugged.
#[debug_handler]
pub async fn post_classify(
    State(state): State<Arc<APIState>>,
    Json(ClassifyRequest { url }): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>> {
    let response = match classify(&url, &state.rewrite_config) {
        Classification::Rewrite(replacement) => ClassifyResponse {
            eligible: true,
            replacement: Some(replacement),
            reason: None,
        },
        Classification::Skip(reason) => ClassifyResponse {
            eligible: false,
            replacement: None,
            reason: Some(reason.as_str()),
        },
    };

    Ok(Json(response))
}
