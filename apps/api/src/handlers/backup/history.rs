use super::*;

#[derive(Debug, serde::Deserialize)]
pub struct BackupHistoryQuery {
    pub limit: Option<usize>,
}

pub async fn backup_history_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Query(query): Query<BackupHistoryQuery>,
) -> ApiResult<Json<BackupHistoryResponse>> {
    let limit = query.limit.unwrap_or(50);

    let backups = state
        .backup_service
        .list_recent_backups(&user, limit)
        .await?
        .into_iter()
        .map(BackupRecordResponse::from)
        .collect();
    let deletions = state
        .deletion_service
        .list_recent_deletions(&user, limit)
        .await?
        .into_iter()
        .map(DeletionRecordResponse::from)
        .collect();

    Ok(Json(BackupHistoryResponse { backups, deletions }))
}
