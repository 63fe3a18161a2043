use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diesel_async::pooled_connection::PoolError;
use serde_json::json;
use shared::LibraryError;

/// Error type for every service operation and HTTP handler.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Library(err) => match err {
                LibraryError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                LibraryError::OutOfStock { .. } => (StatusCode::CONFLICT, "OUT_OF_STOCK"),
                LibraryError::InvalidStock { .. } => (StatusCode::BAD_REQUEST, "INVALID_STOCK"),
                LibraryError::AlreadyReturned { .. } => {
                    (StatusCode::BAD_REQUEST, "ALREADY_RETURNED")
                }
                LibraryError::ExternalService { .. } => {
                    (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE_ERROR")
                }
                LibraryError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                LibraryError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            },
            AppError::Database(_) | AppError::Pool(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Internal error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
