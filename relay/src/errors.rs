use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for request-level relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// The client sent a request the relay cannot use.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("missing coordinates")]
    MissingCoordinates,

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("invalid JSON body: {0}")]
    MalformedJson(String),

    #[error("invalid form body: {0}")]
    MalformedForm(String),

    #[error("invalid multipart body: {0}")]
    MalformedMultipart(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// The photo payload could not be turned into image bytes.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64 photo payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("photo payload is not a string")]
    NotAString,
}

/// A call to the alert channel failed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("alert channel did not respond within {0:?}")]
    Timeout(Duration),

    #[error("alert channel request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("alert channel returned {status}")]
    Status {
        status: reqwest::StatusCode,
        body: Option<Value>,
    },

    #[error("alert channel rejected the request: {description}")]
    Rejected { description: String, body: Value },

    #[error("alert channel returned a non-JSON response")]
    InvalidResponse,

    #[error("alert channel URL cannot be a base: {0}")]
    InvalidUrl(String),

    #[error("failed to read staged photo: {0}")]
    Staging(#[from] std::io::Error),
}

impl DeliveryError {
    /// The body the provider answered with, if it sent a JSON one.
    pub fn provider_response(&self) -> Option<&Value> {
        match self {
            DeliveryError::Status { body, .. } => body.as_ref(),
            DeliveryError::Rejected { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Errors that end a `/send_data` request before delivery.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("failed to stage photo upload")]
    Staging(#[source] std::io::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let RelayError::Staging(e) = &self {
            tracing::error!(error = %e, "Failed to stage photo upload");
        } else if status.is_server_error() {
            tracing::error!(error = %self, "Failed to handle alert");
        } else {
            tracing::info!(status = %status, error = %self, "Rejected alert");
        }

        let body = Json(json!({
            "ok": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
