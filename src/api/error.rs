use crate::error::{ErrorKind, GatewayError};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error returned by the HTTP handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub gateway_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'a str>,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
            gateway_code: None,
        }
    }

    /// Any webhook failure maps to 400.
    pub fn notification_rejected(err: &GatewayError) -> Self {
        let code = match err.kind() {
            ErrorKind::Authenticity => "notification_rejected",
            _ => "invalid_notification",
        };
        Self::bad_request(code, err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let (status, code) = match (&err, err.kind()) {
            (_, ErrorKind::Validation) => (StatusCode::BAD_REQUEST, "validation_error"),
            (GatewayError::Timeout { .. }, _) => (StatusCode::GATEWAY_TIMEOUT, "gateway_timeout"),
            (_, ErrorKind::Transport) => (StatusCode::BAD_GATEWAY, "gateway_unavailable"),
            (_, ErrorKind::Rejected) => (StatusCode::BAD_GATEWAY, "gateway_rejected"),
            (_, ErrorKind::Authenticity) => (StatusCode::BAD_REQUEST, "notification_rejected"),
        };

        Self {
            status,
            code,
            message: err.to_string(),
            gateway_code: err.error_code().map(str::to_string),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalid_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.code,
            message: &self.message,
            error_code: self.gateway_code.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}
