use std::sync::Arc;

use axum::debug_handler;
use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::rewriting::{OutputForm, RawOptions, RewriteConfig};
use crate::state::APIState;

#[derive(Serialize)]
pub struct ResolveResponse {
    pub cdn_base_url: String,
    pub included_dirs: Vec<String>,
    pub excluded_extensions: Vec<String>,
    pub output_form: &'static str,
    pub force_https: bool,
    pub activation: &'static str,
}

/// Validates a set of options against the served site without applying them.
///
/// Invalid options come back as a 422 with the reason.
#[debug_handler]
pub async fn post_resolve(
    State(state): State<Arc<APIState>>,
    Json(options): Json<RawOptions>,
) -> Result<Json<ResolveResponse>> {
    let config = RewriteConfig::resolve(&options, &state.config.home_url)?;

    Ok(Json(ResolveResponse {
        cdn_base_url: config.cdn_base_url().to_string(),
        included_dirs: config.included_dirs().to_vec(),
        excluded_extensions: config.excluded_extensions().to_vec(),
        output_form: match config.output_form() {
            OutputForm::Relative => "relative",
            OutputForm::Absolute => "absolute",
        },
        force_https: config.force_https(),
        activation: config.activation().as_str(),
    }))
}
