use super::*;

pub async fn delete_archived_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    headers: HeaderMap,
    payload: Result<Json<DeleteArchivedRequest>, JsonRejection>,
) -> ApiResult<Json<DeleteArchivedResponse>> {
    let payload = json_body(payload)?;
    let outcome = state
        .deletion_service
        .purge_archived(
            &user,
            EvidenceDeletionRequest {
                start_date: payload.start_date,
                end_date: payload.end_date,
                confirmation_token: payload.confirmation_token,
                ip_address: client_ip(&headers),
            },
        )
        .await?;

    Ok(Json(DeleteArchivedResponse::from(outcome)))
}
