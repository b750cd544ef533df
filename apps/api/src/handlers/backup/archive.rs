use super::*;

const TOTAL_FILES_HEADER: HeaderName = HeaderName::from_static("x-total-files");
const TOTAL_SIZE_HEADER: HeaderName = HeaderName::from_static("x-total-size-bytes");
const BACKUP_ID_HEADER: HeaderName = HeaderName::from_static("x-backup-id");

pub async fn backup_evidence_files_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    headers: HeaderMap,
    payload: Result<Json<BackupEvidenceRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let payload = json_body(payload)?;
    let EvidenceBackupDownload {
        backup_id,
        file_name,
        total_files,
        total_bytes,
        missing_size_count,
        body,
        completion,
    } = state
        .backup_service
        .start_backup(
            &user,
            EvidenceBackupRequest {
                start_date: payload.start_date,
                end_date: payload.end_date,
                ip_address: client_ip(&headers),
            },
        )
        .await?;

    info!(
        backup_id = %backup_id,
        total_files,
        total_bytes,
        missing_size_count,
        "streaming evidence archive"
    );
    tokio::spawn(log_completion(backup_id, completion));

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .map_err(|error| AppError::Internal(format!("invalid archive file name: {error}")))?;

    let mut response = Response::new(Body::from_stream(body));
    let response_headers = response.headers_mut();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    response_headers.insert(CONTENT_DISPOSITION, disposition);
    response_headers.insert(TOTAL_FILES_HEADER, HeaderValue::from(total_files));
    response_headers.insert(TOTAL_SIZE_HEADER, HeaderValue::from(total_bytes));
    response_headers.insert(
        BACKUP_ID_HEADER,
        HeaderValue::from_str(&backup_id.to_string())
            .map_err(|error| AppError::Internal(format!("invalid backup id header: {error}")))?,
    );

    Ok(response)
}

async fn log_completion(backup_id: Uuid, completion: JoinHandle<ArchiveRunReport>) {
    match completion.await {
        Ok(report) => info!(
            backup_id = %backup_id,
            status = report.status.as_str(),
            added_files = report.added_files,
            skipped_files = report.skipped_files,
            "evidence archive run finished"
        ),
        Err(join_error) => error!(
            backup_id = %backup_id,
            error = %join_error,
            "evidence archive run panicked"
        ),
    }
}
