//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use pincache_types::error::FetchError;

use crate::http::response::{ApiResponse, RequestTimer};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The requested dataset is not configured.
    DatasetNotFound { name: String, known: Vec<String> },
    /// Backend fetch failure.
    Fetch(FetchError),
    /// Bad request parameters.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        AppError::Fetch(e)
    }
}

impl AppError {
    /// Status code and machine-readable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::DatasetNotFound { .. } => (StatusCode::NOT_FOUND, "DATASET_NOT_FOUND"),
            AppError::Fetch(FetchError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "CHUNK_NOT_FOUND")
            }
            AppError::Fetch(
                FetchError::Unauthorized
                | FetchError::RateLimited { .. }
                | FetchError::Server { .. },
            ) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            AppError::Fetch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FETCH_ERROR"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::DatasetNotFound { name, .. } => format!("Dataset '{name}' not found"),
            AppError::Fetch(e) => e.to_string(),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }
}

/// An [`AppError`] tagged with the request it ended.
#[derive(Debug)]
pub struct RequestError {
    error: AppError,
    request_id: String,
    response_time_ms: u64,
}

impl RequestError {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl AppError {
    /// Attach the id and elapsed time of the request that failed.
    pub fn during(self, timer: &RequestTimer) -> RequestError {
        RequestError {
            error: self,
            request_id: timer.request_id.clone(),
            response_time_ms: timer.elapsed_ms(),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, code) = self.error.status_and_code();
        let message = self.error.message();
        if status.is_server_error() {
            tracing::warn!(request_id = %self.request_id, code, error = %message, "request failed");
        }

        let mut body =
            ApiResponse::error(status, code, &message, self.request_id, self.response_time_ms);
        if let AppError::DatasetNotFound { known, .. } = &self.error {
            body = body.with_details(serde_json::json!({ "known": known }));
        }
        body.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_to_gateway_codes() {
        let cases = [
            (
                FetchError::NotFound { key: "pins/chunk:9".into() },
                StatusCode::NOT_FOUND,
                "CHUNK_NOT_FOUND",
            ),
            (FetchError::Unauthorized, StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            (
                FetchError::RateLimited { retry_after_ms: None },
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
            ),
            (
                FetchError::Server { status: 503, message: String::new() },
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
            ),
            (
                FetchError::Decode("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "FETCH_ERROR",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(AppError::from(error).status_and_code(), (status, code));
        }
    }

    #[test]
    fn unknown_dataset_is_404() {
        let error = AppError::DatasetNotFound {
            name: "nope".into(),
            known: vec!["pins".into()],
        };
        assert_eq!(error.status_and_code().0, StatusCode::NOT_FOUND);
        let response = error.during(&RequestTimer::start()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_is_400() {
        let response = AppError::Validation("bad filter".into())
            .during(&RequestTimer::start())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn error_envelope_carries_request_id() {
        let timer = RequestTimer::start();
        let id = timer.request_id.clone();
        let response = AppError::Fetch(FetchError::Unauthorized)
            .during(&timer)
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["meta"]["request_id"], id.as_str());
        assert!(body["meta"]["response_time_ms"].is_u64());
        assert_eq!(body["errors"][0]["code"], "UPSTREAM_ERROR");
    }
}
