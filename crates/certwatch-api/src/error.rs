//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use certwatch_types::api::MessageResponse;

/// An error returned by a request handler. The display text becomes the
/// `msg` field of the response body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Storage errors: unique-constraint failures are conflicts, anything else
/// is an internal error.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if certwatch_db::is_constraint_violation(&err) {
            Self::Conflict("record already exists".into())
        } else {
            Self::Internal(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = match &self {
            Self::Internal(e) => {
                error!("Request failed: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(MessageResponse::new(msg))).into_response()
    }
}
