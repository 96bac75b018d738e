//! Filesystem-backed artifact bucket for finished renders.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::{config::StorageSettings, util::bytes::format_bytes};

const ARTIFACT_PREFIX: &str = "renders";
const DEFAULT_ARTIFACT_EXTENSION: &str = "mp4";

/// Errors that can occur while interacting with the artifact bucket.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("invalid artifact key")]
    InvalidKey,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata describing a persisted render artifact.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub key: String,
    pub public_url: String,
    pub size_bytes: u64,
}

/// Filesystem-backed artifact storage rooted at the configured bucket directory.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl ArtifactStore {
    /// Initialise storage rooted at the configured directory, creating it if necessary.
    pub fn new(settings: &StorageSettings) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&settings.root)?;
        Ok(Self {
            root: settings.root.clone(),
            public_base_url: settings
                .public_base_url
                .as_ref()
                .map(|url| url.as_str().trim_end_matches('/').to_string()),
        })
    }

    /// Copy a finished render into the bucket under `renders/{job_id}.{ext}`.
    ///
    /// The extension follows the source file and falls back to mp4.
    pub async fn persist(
        &self,
        job_id: &str,
        source: &Path,
    ) -> Result<StoredArtifact, ArtifactStoreError> {
        let extension = source
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ARTIFACT_EXTENSION.to_string());

        let key = format!("{ARTIFACT_PREFIX}/{job_id}.{extension}");
        let absolute = self.resolve(&key)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let size_bytes = fs::copy(source, &absolute).await?;
        metrics::histogram!("fucina_artifact_bytes").record(size_bytes as f64);

        info!(
            target: "fucina::storage",
            job_id,
            key,
            size = %format_bytes(size_bytes),
            "persisted render artifact"
        );

        Ok(StoredArtifact {
            public_url: self.public_url(&key),
            key,
            size_bytes,
        })
    }

    /// Public URL the artifact is reachable under, or the bare key when no
    /// base URL is configured.
    pub fn public_url(&self, key: &str) -> String {
        match self.public_base_url.as_deref() {
            Some(base) => format!("{base}/{key}"),
            None => key.to_string(),
        }
    }

    /// Verify the bucket root is writable by creating and removing a marker file.
    pub async fn probe(&self) -> Result<(), ArtifactStoreError> {
        let marker = self.root.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&marker, b"ok").await?;
        fs::remove_file(&marker).await?;
        Ok(())
    }

    /// Resolve a bucket key to its absolute filesystem path.
    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactStoreError> {
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(ArtifactStoreError::InvalidKey);
        }

        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use url::Url;

    use crate::config::StorageSettings;

    fn store_in(dir: &TempDir, public_base_url: Option<&str>) -> ArtifactStore {
        let settings = StorageSettings {
            root: dir.path().to_path_buf(),
            public_base_url: public_base_url.map(|value| Url::parse(value).unwrap()),
        };
        ArtifactStore::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn persist_copies_artifact_under_renders_prefix() {
        let bucket = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let source = scratch.path().join("job-7.mp4");
        tokio::fs::write(&source, b"frames").await.unwrap();

        let store = store_in(&bucket, None);
        let stored = store.persist("job-7", &source).await.unwrap();

        assert_eq!(stored.key, "renders/job-7.mp4");
        assert_eq!(stored.size_bytes, 6);
        let copied = tokio::fs::read(bucket.path().join("renders/job-7.mp4"))
            .await
            .unwrap();
        assert_eq!(copied, b"frames");
    }

    #[tokio::test]
    async fn persist_defaults_extension_when_source_has_none() {
        let bucket = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let source = scratch.path().join("output");
        tokio::fs::write(&source, b"x").await.unwrap();

        let store = store_in(&bucket, None);
        let stored = store.persist("job-1", &source).await.unwrap();

        assert_eq!(stored.key, "renders/job-1.mp4");
    }

    #[tokio::test]
    async fn persist_rejects_traversal_in_job_id() {
        let bucket = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let source = scratch.path().join("evil.mp4");
        tokio::fs::write(&source, b"x").await.unwrap();

        let store = store_in(&bucket, None);
        let err = store.persist("../evil", &source).await.unwrap_err();

        assert!(matches!(err, ArtifactStoreError::InvalidKey));
    }

    #[tokio::test]
    async fn public_url_prefers_configured_base() {
        let bucket = TempDir::new().unwrap();

        let with_base = store_in(&bucket, Some("https://renders.example.net/"));
        assert_eq!(
            with_base.public_url("renders/job-1.mp4"),
            "https://renders.example.net/renders/job-1.mp4"
        );

        let without_base = store_in(&bucket, None);
        assert_eq!(
            without_base.public_url("renders/job-1.mp4"),
            "renders/job-1.mp4"
        );
    }

    #[tokio::test]
    async fn probe_succeeds_on_writable_root() {
        let bucket = TempDir::new().unwrap();
        let store = store_in(&bucket, None);

        store.probe().await.unwrap();
    }
}
