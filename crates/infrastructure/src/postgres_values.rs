//! Conversions between domain counters and PostgreSQL `BIGINT` columns.

use evidex_core::{AppError, AppResult};

pub(crate) fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn from_bigint(column: &str, value: i64) -> AppResult<u64> {
    u64::try_from(value)
        .map_err(|_| AppError::Internal(format!("column '{column}' holds negative value {value}")))
}
