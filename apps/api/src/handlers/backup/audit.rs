use super::*;

pub async fn verify_audit_chain_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<AuditChainVerificationResponse>> {
    let verification = state.audit_trail.verify_chain(&user).await?;
    if !verification.valid {
        error!(
            first_broken_at = ?verification.first_broken_at,
            "audit hash chain verification failed"
        );
    }

    Ok(Json(AuditChainVerificationResponse::from(verification)))
}
