//! REST error responses and the status code for each gateway error

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GatewayError;

/// Failure of a REST request
#[derive(Debug)]
pub enum ApiError {
    /// A required body field was absent or empty
    MissingField(&'static str),
    /// The session manager rejected or failed the operation
    Gateway(GatewayError),
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError::Gateway(e)
    }
}

/// HTTP status for a core error
pub(crate) fn status_for(e: &GatewayError) -> StatusCode {
    match e {
        GatewayError::InvalidParams(_) | GatewayError::PolicyViolation(_) => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Connection(_)
        | GatewayError::Authentication(_)
        | GatewayError::Transport(_)
        | GatewayError::Transfer(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Config(_) | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingField(field) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("{field} is required") })),
            )
                .into_response(),
            ApiError::Gateway(e) => {
                let status = status_for(&e);
                if e.is_client_fault() {
                    tracing::warn!("request rejected: {e}");
                } else {
                    tracing::error!("request failed: {e}");
                }
                (
                    status,
                    Json(json!({ "success": false, "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
