use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use evidex_core::AppError;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionManagerLayer;
use tower_sessions_sqlx_store::PostgresStore;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

pub fn build_router(
    app_state: AppState,
    session_layer: SessionManagerLayer<PostgresStore>,
) -> Result<Router, AppError> {
    let protected_routes = Router::new()
        .route(
            "/api/backup/evidence-files",
            post(handlers::backup::backup_evidence_files_handler),
        )
        .route(
            "/api/backup/delete-archived",
            post(handlers::backup::delete_archived_handler),
        )
        .route(
            "/api/backup/history",
            get(handlers::backup::backup_history_handler),
        )
        .route(
            "/api/backup/audit-log/verify",
            get(handlers::backup::verify_audit_chain_handler),
        )
        .route_layer(from_fn(middleware::require_auth));

    let cors_layer = cors::build_cors_layer(&app_state.frontend_url)?;

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(protected_routes)
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_same_origin_for_mutations,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(session_layer)
        .with_state(app_state))
}
