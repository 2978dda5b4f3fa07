//! Error responses.
//!
//! # Responsibilities
//! - Map `GatewayError` kinds to HTTP status codes
//! - Render a categorized JSON body: `{success, error: {type, detail}}`
//! - Add `Retry-After` and `WWW-Authenticate` where they apply

use axum::http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::gateway::error::retry_after_secs;
use crate::gateway::GatewayError;

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingToken
            | GatewayError::InvalidToken { .. }
            | GatewayError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::LockedOut { .. } | GatewayError::RateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            GatewayError::KeyUnavailable | GatewayError::IdpUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "success": false,
            "error": {
                "type": self.kind(),
                "detail": self.to_string(),
            }
        });

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        if let Some(retry_after) = self.retry_after() {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(&retry_after)));
        }
        match &self {
            GatewayError::MissingToken => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::InvalidToken { .. } => {
                headers.insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Bearer error="invalid_token""#),
                );
            }
            _ => {}
        }

        response
    }
}
