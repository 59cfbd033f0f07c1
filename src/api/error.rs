//! Error responses.

use crate::error::TrustError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error("{0}")]
    Forbidden(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Trust(err) => match err {
                TrustError::EmptyName | TrustError::InvalidName => StatusCode::BAD_REQUEST,
                TrustError::UnknownMember(_) => StatusCode::NOT_FOUND,
                TrustError::InvalidCode | TrustError::AlreadyVoted | TrustError::PollClosed => {
                    StatusCode::CONFLICT
                }
                TrustError::UnknownCandidate(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TrustError::MemberSuspended(_) => StatusCode::FORBIDDEN,
                TrustError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
                // Nothing was committed; the request may be retried.
                TrustError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Trust(err) => err.kind(),
            ApiError::Forbidden(_) => "forbidden",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
