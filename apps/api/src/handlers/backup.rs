use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;

use evidex_application::{
    ArchiveRunReport, EvidenceBackupDownload, EvidenceBackupRequest, EvidenceDeletionRequest,
};
use evidex_core::{AppError, UserIdentity};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::dto::{
    AuditChainVerificationResponse, BackupEvidenceRequest, BackupHistoryResponse,
    BackupRecordResponse, DeleteArchivedRequest, DeleteArchivedResponse, DeletionRecordResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

mod archive;
mod audit;
mod deletion;
mod history;

pub use archive::backup_evidence_files_handler;
pub use audit::verify_audit_chain_handler;
pub use deletion::delete_archived_handler;
pub use history::backup_history_handler;

/// Turns a rejected JSON body into a validation error so it renders as `{error}`.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        AppError::Validation(format!("invalid request body: {}", rejection.body_text()))
    })
}

/// First address of `x-forwarded-for`, as set by the fronting proxy.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
