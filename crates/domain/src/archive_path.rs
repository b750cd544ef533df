use std::collections::HashSet;

use crate::evidence::{EvidenceSubmission, StorageKey};

/// File name of the JSON index written as the last archive entry.
pub const MANIFEST_FILE_NAME: &str = "BACKUP_MANIFEST.json";

const MAX_SEGMENT_CHARS: usize = 120;
const FALLBACK_FILE_NAME: &str = "evidence";

/// Builds the archive entry path for one submission:
/// `{licenseId}_{name}/{date}_{activityName}_{originalFilename}`.
#[must_use]
pub fn archive_entry_path(submission: &EvidenceSubmission) -> String {
    let original_file_name = StorageKey::from_reference(&submission.evidence_reference)
        .map(|key| key.file_name().to_owned())
        .unwrap_or_else(|_| FALLBACK_FILE_NAME.to_owned());

    let folder = sanitize_segment(&format!(
        "{}_{}",
        submission.license_id, submission.practitioner_name
    ));
    let file = sanitize_segment(&format!(
        "{}_{}_{}",
        submission.submitted_on.format("%Y-%m-%d"),
        submission.activity_name,
        original_file_name
    ));

    format!("{folder}/{file}")
}

/// Plans collision-free entry paths for `submissions`, in input order.
///
/// A path already taken gets the first eight hex digits of the submission id
/// appended to its file stem; a numeric counter follows if that is taken too.
#[must_use]
pub fn plan_archive_paths(submissions: &[EvidenceSubmission]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(submissions.len());
    let mut paths = Vec::with_capacity(submissions.len());

    for submission in submissions {
        let base = archive_entry_path(submission);
        let mut candidate = base.clone();

        if taken.contains(&candidate) {
            let simple_id = submission.submission_id.simple().to_string();
            let tag: String = simple_id.chars().take(8).collect();
            candidate = with_stem_suffix(&base, &tag);

            let mut counter = 2_u32;
            while taken.contains(&candidate) {
                candidate = with_stem_suffix(&base, &format!("{tag}-{counter}"));
                counter = counter.saturating_add(1);
            }
        }

        taken.insert(candidate.clone());
        paths.push(candidate);
    }

    paths
}

fn with_stem_suffix(path: &str, suffix: &str) -> String {
    let (directory, file) = path.rsplit_once('/').unwrap_or(("", path));
    let file = match file.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}-{suffix}.{extension}"),
        _ => format!("{file}-{suffix}"),
    };

    if directory.is_empty() {
        file
    } else {
        format!("{directory}/{file}")
    }
}

fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|character| match character {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            character if character.is_control() => '_',
            character => character,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        return "unknown".to_owned();
    }

    if trimmed.chars().count() <= MAX_SEGMENT_CHARS {
        return trimmed.to_owned();
    }

    // Keep the tail so the original extension survives truncation.
    let skip = trimmed.chars().count() - MAX_SEGMENT_CHARS;
    trimmed.chars().skip(skip).collect()
}
