use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::debug;

use evidex_application::{EvidenceByteStream, EvidenceStorage};
use evidex_core::{AppError, AppResult};
use evidex_domain::StorageKey;

/// Connection settings for an S3-compatible evidence bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3StorageSettings {
    /// Bucket holding evidence objects.
    pub bucket: String,
    /// Region name.
    pub region: String,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    /// Access key id; falls back to the ambient AWS environment when absent.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
}

/// `object_store`-backed evidence storage.
#[derive(Clone)]
pub struct ObjectStoreEvidenceStorage {
    store: Option<Arc<dyn ObjectStore>>,
}

impl ObjectStoreEvidenceStorage {
    /// Wraps an existing object store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Storage that reports itself as unconfigured and rejects every call.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self { store: None }
    }

    /// Builds an S3 client from `settings`.
    pub fn from_s3_settings(settings: &S3StorageSettings) -> AppResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"))
                .with_virtual_hosted_style_request(false);
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            builder = builder
                .with_access_key_id(access_key_id)
                .with_secret_access_key(secret_access_key);
        }

        let store = builder.build().map_err(|error| {
            AppError::Internal(format!("failed to build evidence storage client: {error}"))
        })?;

        Ok(Self::new(Arc::new(store)))
    }

    fn store(&self) -> AppResult<&Arc<dyn ObjectStore>> {
        self.store.as_ref().ok_or_else(|| {
            AppError::StorageUnavailable("evidence storage is not configured".to_owned())
        })
    }
}

fn object_path(key: &StorageKey) -> AppResult<Path> {
    Path::from_url_path(key.as_str())
        .map_err(|error| AppError::Validation(format!("invalid storage key '{key}': {error}")))
}

#[async_trait]
impl EvidenceStorage for ObjectStoreEvidenceStorage {
    fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    async fn open_stream(&self, key: &StorageKey) -> AppResult<EvidenceByteStream> {
        let store = self.store()?;
        let path = object_path(key)?;

        let result = store.get(&path).await.map_err(|error| match error {
            object_store::Error::NotFound { .. } => {
                AppError::NotFound(format!("evidence object '{key}' does not exist"))
            }
            other => AppError::Internal(format!("failed to open evidence object '{key}': {other}")),
        })?;

        let key = key.to_string();
        Ok(Box::pin(result.into_stream().map_err(move |error| {
            AppError::Internal(format!("evidence object '{key}' stream failed: {error}"))
        })))
    }

    async fn delete(&self, key: &StorageKey) -> AppResult<bool> {
        let store = self.store()?;
        let path = object_path(key)?;

        // S3 deletes are idempotent, so existence is checked first.
        match store.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                debug!(key = %key, "evidence object already absent");
                return Ok(false);
            }
            Err(error) => {
                return Err(AppError::Internal(format!(
                    "failed to inspect evidence object '{key}': {error}"
                )));
            }
        }

        store.delete(&path).await.map_err(|error| {
            AppError::Internal(format!("failed to delete evidence object '{key}': {error}"))
        })?;

        Ok(true)
    }

    async fn object_size(&self, key: &StorageKey) -> AppResult<Option<u64>> {
        let store = self.store()?;
        let path = object_path(key)?;

        match store.head(&path).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(error) => Err(AppError::Internal(format!(
                "failed to probe evidence object '{key}': {error}"
            ))),
        }
    }
}
