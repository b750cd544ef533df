use serde::Serialize;
use ts_rs::TS;

/// API error payload.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/error-response.ts"
)]
pub struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    file_count: Option<usize>,
}

impl ErrorResponse {
    pub(super) fn new(error: String) -> Self {
        Self {
            error,
            retry_after_seconds: None,
            file_count: None,
        }
    }

    pub(super) fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    pub(super) fn with_file_count(mut self, count: usize) -> Self {
        self.file_count = Some(count);
        self
    }
}
