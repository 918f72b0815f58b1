//! HTTP-facing errors.
//!
//! Error bodies follow JSend: <https://github.com/omniti-labs/jsend>

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        ErrorResponse {
            status: "error",
            message: message.into(),
            code: None,
            data: None,
        }
    }

    pub fn with_code(mut self, code: StatusCode) -> Self {
        self.code = Some(code.as_u16());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no valid email addresses in request")]
    NoValidAddresses { rejected: Vec<String> },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn http_code(&self) -> StatusCode {
        match self {
            Self::NoValidAddresses { .. } => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn http_message(&self) -> String {
        match self {
            Self::Store(_) => "an internal server error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let code = self.http_code();
        // Server errors are traced here since the body hides the detail.
        if code.is_server_error() {
            tracing::error!("Error Status {}: {}", code, self);
        }

        let mut body = ErrorResponse::new(&self.http_message()).with_code(code);
        if let Self::NoValidAddresses { rejected } = &self {
            body = body.with_data(serde_json::json!({ "rejected": rejected }));
        }
        (code, Json(body)).into_response()
    }
}
