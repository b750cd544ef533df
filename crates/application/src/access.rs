use evidex_core::{AppError, AppResult, UserIdentity};

/// Rejects callers whose role may not run archival or purge operations.
pub(crate) fn require_privileged(actor: &UserIdentity) -> AppResult<()> {
    if actor.role().is_privileged() {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "role '{}' may not manage evidence archives",
        actor.role().as_str()
    )))
}
