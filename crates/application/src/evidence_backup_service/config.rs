use std::time::Duration;

/// Tuning knobs for evidence archival runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Largest candidate set a single archive may hold.
    pub max_files: usize,
    /// Concurrent download workers per run.
    pub concurrency: usize,
    /// Attempts to open one object before it is skipped.
    pub download_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_backoff: Duration,
    /// Concurrent metadata probes while resolving sizes.
    pub size_probe_concurrency: usize,
    /// Largest single object buffered into the archive; bigger ones are skipped.
    pub max_file_bytes: u64,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            max_files: 5_000,
            concurrency: 6,
            download_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            size_probe_concurrency: 8,
            max_file_bytes: 512 * 1024 * 1024,
        }
    }
}
