//! HTTP error mapping
//!
//! Every handler returns [`ApiError`]; the status code comes from the
//! error kind, never from the message.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use krishilok::{AdvisoryError, ErrorKind};

#[derive(Debug)]
pub struct ApiError(pub AdvisoryError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError(AdvisoryError::Validation(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self.0.kind() {
            ErrorKind::Fatal => "Internal server error".to_string(),
            _ => self.0.to_string(),
        }
    }
}

impl From<AdvisoryError> for ApiError {
    fn from(err: AdvisoryError) -> Self {
        ApiError(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(format!("Malformed upload: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind();
        if kind == ErrorKind::Fatal {
            error!("Request failed: {}", self.0);
        }

        let body = json!({
            "success": false,
            "error": self.public_message(),
            "kind": kind.as_str(),
        });
        (status, Json(body)).into_response()
    }
}
