/**
 * Error Conversion
 * 
 * `BackendError` implements `IntoResponse` so the operational routes can
 * return it directly. The body is always JSON:
 * 
 * ```json
 * { "error": "backup mirror is not configured", "status": 503 }
 * ```
 */

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::backend::error::types::BackendError;

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        tracing::debug!("[Ops] Responding with error {}: {}", status.as_u16(), message);

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        let mut response = Response::new(Body::from(body.to_string()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        );
        response
    }
}
