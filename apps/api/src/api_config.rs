use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use evidex_application::{BackupPolicy, DeletionPolicy};
use evidex_core::AppError;
use evidex_infrastructure::S3StorageSettings;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub cookie_secure: bool,
    pub storage: Option<S3StorageSettings>,
    pub backup_policy: BackupPolicy,
    pub deletion_policy: DeletionPolicy,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let database_url = required(&lookup, "DATABASE_URL")?;

        let frontend_url = optional(&lookup, "FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_owned());
        let frontend_url = Url::parse(&frontend_url)
            .map_err(|error| AppError::Validation(format!("invalid FRONTEND_URL: {error}")))?
            .origin()
            .ascii_serialization();

        let session_secret = required(&lookup, "SESSION_SECRET")?;
        if session_secret.len() < 32 {
            return Err(AppError::Validation(
                "SESSION_SECRET must be at least 32 characters".to_owned(),
            ));
        }

        let api_host = optional(&lookup, "API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = parsed(&lookup, "API_PORT", 3001_u16)?;
        let cookie_secure = optional(&lookup, "SESSION_COOKIE_SECURE")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        let storage = optional(&lookup, "EVIDENCE_STORAGE_BUCKET").map(|bucket| S3StorageSettings {
            bucket,
            region: optional(&lookup, "EVIDENCE_STORAGE_REGION")
                .unwrap_or_else(|| "us-east-1".to_owned()),
            endpoint: optional(&lookup, "EVIDENCE_STORAGE_ENDPOINT"),
            access_key_id: optional(&lookup, "EVIDENCE_STORAGE_ACCESS_KEY_ID"),
            secret_access_key: optional(&lookup, "EVIDENCE_STORAGE_SECRET_ACCESS_KEY"),
        });

        let backup_defaults = BackupPolicy::default();
        let backup_policy = BackupPolicy {
            max_files: positive(&lookup, "BACKUP_MAX_FILES", backup_defaults.max_files)?,
            concurrency: positive(&lookup, "BACKUP_CONCURRENCY", backup_defaults.concurrency)?,
            download_attempts: positive(
                &lookup,
                "BACKUP_DOWNLOAD_ATTEMPTS",
                backup_defaults.download_attempts,
            )?,
            retry_backoff: Duration::from_millis(parsed(
                &lookup,
                "BACKUP_RETRY_BACKOFF_MS",
                u64::try_from(backup_defaults.retry_backoff.as_millis()).unwrap_or(500),
            )?),
            max_file_bytes: positive(
                &lookup,
                "BACKUP_MAX_FILE_BYTES",
                backup_defaults.max_file_bytes,
            )?,
            ..backup_defaults
        };

        let deletion_defaults = DeletionPolicy::default();
        let deletion_policy = DeletionPolicy {
            max_files: positive(&lookup, "DELETION_MAX_FILES", deletion_defaults.max_files)?,
            cooldown: Duration::from_secs(parsed(
                &lookup,
                "DELETION_COOLDOWN_SECONDS",
                deletion_defaults.cooldown.as_secs(),
            )?),
            cooldown_scope: parsed(
                &lookup,
                "DELETION_COOLDOWN_SCOPE",
                deletion_defaults.cooldown_scope,
            )?,
            ..deletion_defaults
        };

        Ok(Self {
            migrate_only,
            database_url,
            frontend_url,
            api_host,
            api_port,
            cookie_secure,
            storage,
            backup_policy,
            deletion_policy,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, AppError> {
    optional(lookup, name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name} '{value}': {error}"))),
        None => Ok(default),
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parsed(lookup, name, default)?;
    if value <= T::default() {
        return Err(AppError::Validation(format!("{name} must be greater than zero")));
    }

    Ok(value)
}
