use std::str::FromStr;
use std::time::Duration;

use evidex_core::AppError;

/// Which deletions count towards the cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownScope {
    /// Only the caller's own previous deletion.
    #[default]
    PerActor,
    /// The previous deletion by anyone.
    SystemWide,
}

impl CooldownScope {
    /// Returns the configuration value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerActor => "actor",
            Self::SystemWide => "system",
        }
    }
}

impl FromStr for CooldownScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "actor" => Ok(Self::PerActor),
            "system" => Ok(Self::SystemWide),
            other => Err(AppError::Validation(format!(
                "unknown cooldown scope '{other}', expected 'actor' or 'system'"
            ))),
        }
    }
}

/// Safety settings for evidence purges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPolicy {
    /// Exact phrase the caller must echo back.
    pub confirmation_phrase: String,
    /// Largest candidate set one purge may touch.
    pub max_files: usize,
    /// Minimum gap between two purges.
    pub cooldown: Duration,
    /// Whose purges count towards `cooldown`.
    pub cooldown_scope: CooldownScope,
    /// How recent the covering backup must be.
    pub covering_backup_max_age: Duration,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self {
            confirmation_phrase: "DELETE".to_owned(),
            max_files: 5_000,
            cooldown: Duration::from_secs(600),
            cooldown_scope: CooldownScope::PerActor,
            covering_backup_max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}
