use axum::Json;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use evidex_core::AppError;
use tracing::error;

mod types;

pub use types::ErrorResponse;

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::Validation(_) | AppError::LimitExceeded { .. } | AppError::SafetyGate(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = match self.0 {
            AppError::Validation(message)
            | AppError::NotFound(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::StorageUnavailable(message)
            | AppError::SafetyGate(message) => ErrorResponse::new(message),
            AppError::LimitExceeded {
                message, requested, ..
            } => ErrorResponse::new(message).with_file_count(requested),
            AppError::CooldownActive {
                retry_after_seconds,
            } => {
                let body = ErrorResponse::new(format!(
                    "a deletion ran recently; try again in {retry_after_seconds} seconds"
                ))
                .with_retry_after(retry_after_seconds);

                let mut response = (status, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
                return response;
            }
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed with an internal error");
                ErrorResponse::new("an unexpected error occurred".to_owned())
            }
        };

        (status, Json(payload)).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
