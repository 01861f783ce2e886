use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use entrevistes_api::ServiceError;

/// Unified API error type.
///
/// Produces `{"error": "<message>"}` JSON responses. Body validation failures
/// also carry a `details` list.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

impl ApiErr {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: Vec::new(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    /// `400 Dades invàlides` with the reasons the body was rejected.
    pub fn invalid(details: Vec<String>) -> Self {
        Self {
            details,
            ..Self::bad_request("Dades invàlides")
        }
    }

    /// Build a closure that logs a DB/IO error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e}");
            Self::internal("Error intern del servidor")
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.message())
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(vec![rejection.body_text()])
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let body = if self.details.is_empty() {
            serde_json::json!({"error": self.message})
        } else {
            serde_json::json!({"error": self.message, "details": self.details})
        };
        (self.status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections use the `ApiErr` shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiErr))]
pub struct AppJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn renders_error_body() {
        let resp = ApiErr::not_found("No trobat").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await, serde_json::json!({"error": "No trobat"}));
    }

    #[tokio::test]
    async fn invalid_body_carries_details() {
        let resp = ApiErr::invalid(vec!["missing field `email`".into()]).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Dades invàlides");
        assert_eq!(body["details"][0], "missing field `email`");
    }

    #[test]
    fn service_errors_keep_status() {
        let err = ApiErr::from(ServiceError::Conflict("ja existeix".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message(), "ja existeix");
    }
}
