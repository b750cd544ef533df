use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use evidex_core::AppError;
use tower_http::cors::CorsLayer;

pub(super) fn build_cors_layer(frontend_url: &str) -> Result<CorsLayer, AppError> {
    Ok(CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static("content-disposition"),
            HeaderName::from_static("retry-after"),
            HeaderName::from_static("x-total-files"),
            HeaderName::from_static("x-total-size-bytes"),
            HeaderName::from_static("x-backup-id"),
        ]))
}
