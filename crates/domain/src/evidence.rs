use std::str::FromStr;

use chrono::NaiveDate;
use evidex_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Review state of a compliance submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting review.
    Pending,
    /// Accepted by a reviewer; the only state eligible for archival.
    Approved,
    /// Rejected by a reviewer.
    Rejected,
}

impl ApprovalStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(AppError::Validation(format!(
                "unknown approval status '{value}'"
            ))),
        }
    }
}

/// Approved compliance submission carrying an evidence object reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceSubmission {
    /// Submission identifier.
    pub submission_id: Uuid,
    /// Practitioner license number.
    pub license_id: String,
    /// Practitioner full name.
    pub practitioner_name: String,
    /// Continuing-education activity title.
    pub activity_name: String,
    /// Date the activity was submitted.
    pub submitted_on: NaiveDate,
    /// Stored reference to the evidence object, either a URL or a bare key.
    pub evidence_reference: String,
    /// Review state.
    pub approval_status: ApprovalStatus,
    /// Object size when already known.
    pub size_bytes: Option<u64>,
}

/// Object-storage key resolved from a stored evidence reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Resolves a storage key from a stored reference.
    ///
    /// Accepts bare keys (`evidence/2024/file.pdf`), absolute paths and
    /// `http`, `https` or `s3` URLs whose path is the key. URL paths keep their
    /// percent-encoding.
    pub fn from_reference(reference: &str) -> AppResult<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(invalid_reference(reference, "reference is empty"));
        }

        let raw_key = match Url::parse(reference) {
            Ok(url) => match url.scheme() {
                "http" | "https" | "s3" => url.path().to_owned(),
                scheme => {
                    return Err(invalid_reference(
                        reference,
                        &format!("unsupported scheme '{scheme}'"),
                    ));
                }
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => reference.to_owned(),
            Err(error) => return Err(invalid_reference(reference, &error.to_string())),
        };

        let key = raw_key.trim_start_matches('/');
        if key.is_empty() || key.ends_with('/') {
            return Err(invalid_reference(reference, "reference has no object name"));
        }

        if key.contains('\\')
            || key.chars().any(char::is_control)
            || key.split('/').any(|segment| segment.is_empty() || segment == "..")
        {
            return Err(invalid_reference(reference, "reference has a malformed path"));
        }

        Ok(Self(key.to_owned()))
    }

    /// Returns the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the last path segment, used as the original file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(self.0.as_str())
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

fn invalid_reference(reference: &str, reason: &str) -> AppError {
    AppError::Validation(format!("invalid evidence reference '{reference}': {reason}"))
}
