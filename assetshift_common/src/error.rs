use core::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::rewriting::{config::ConfigError, driver::RewriteError};

/// Any failure a handler can hit. The status is chosen from the wrapped error's type.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        if self.0.is::<ConfigError>() {
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
        if let Some(RewriteError::UnsupportedEncoding(_)) = self.0.downcast_ref::<RewriteError>() {
            return StatusCode::UNSUPPORTED_MEDIA_TYPE;
        }
        if let Some(err) = self.0.downcast_ref::<reqwest::Error>() {
            return if err.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {:#}", self.0);
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {:#}", self.0);
        }

        (
            status,
            Json(json!({
                "error": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
