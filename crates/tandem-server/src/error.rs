//! Intake request failures, mapped onto the webhook response contract:
//! 401 for authentication problems, 400 for unusable payloads, 500 when
//! the state store cannot take the event.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::payload::PayloadError;

#[derive(Debug, Error)]
pub enum AppError {
    /// The configured signature header was absent from the request
    #[error("webhook signature header missing")]
    MissingSignature,
    /// The signature did not verify against the raw request body
    #[error("webhook signature does not match the request body")]
    SignatureMismatch,
    /// The body could not be parsed into a document notification
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The durable queue rejected the event
    #[error("state store unavailable: {0}")]
    Store(#[from] tandem_core::Error),
}

/// Response body shape shared by every intake failure.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

impl AppError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::SignatureMismatch => StatusCode::UNAUTHORIZED,
            Self::Payload(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "webhook intake failed");
        }
        let body = ErrorResponse {
            status: "error",
            message: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}
