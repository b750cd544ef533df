use super::*;

pub(super) async fn check_postgres(pool: sqlx::PgPool) -> HealthDependencyStatus {
    let check = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&pool)
        .await;

    match check {
        Ok(_) => HealthDependencyStatus {
            status: "ok",
            detail: None,
        },
        Err(error) => HealthDependencyStatus {
            status: "error",
            detail: Some(format!("postgres check failed: {error}")),
        },
    }
}

pub(super) fn check_storage(configured: bool) -> HealthDependencyStatus {
    if configured {
        HealthDependencyStatus {
            status: "ok",
            detail: None,
        }
    } else {
        HealthDependencyStatus {
            status: "error",
            detail: Some("evidence storage is not configured".to_owned()),
        }
    }
}
