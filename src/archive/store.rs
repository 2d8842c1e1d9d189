use crate::config::types::StoreConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object store returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Destination for archived files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `source` as object `name` in `bucket`, replacing
    /// any object of the same name.
    async fn put(&self, bucket: &str, name: &str, source: &Path) -> Result<(), StoreError>;

    fn describe(&self) -> String;
}

/// Object name for a file placed under `folder` (which may be empty).
pub fn object_name(folder: &str, file_name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", folder, file_name)
    }
}

pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    Ok(match config {
        StoreConfig::Local { path } => Arc::new(LocalStore::new(path.clone())),
        StoreConfig::Gcs { endpoint, token } => Arc::new(GcsStore::new(endpoint, token)?),
    })
}

/// Copies objects into `{root}/{bucket}/{name}`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, name: &str) -> PathBuf {
        self.root.join(bucket).join(name)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, bucket: &str, name: &str, source: &Path) -> Result<(), StoreError> {
        let target = self.object_path(bucket, name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        let mut partial = target.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        tokio::fs::copy(source, &partial)
            .await
            .map_err(io_error(source))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(io_error(&target))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

/// Google Cloud Storage through the JSON API's simple media upload.
#[derive(Debug)]
pub struct GcsStore {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GcsStore {
    pub fn new(endpoint: &str, token: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("spike/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn upload_url(&self, bucket: &str) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.endpoint, bucket)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, bucket: &str, name: &str, source: &Path) -> Result<(), StoreError> {
        let body = tokio::fs::read(source).await.map_err(io_error(source))?;

        let response = self
            .client
            .post(self.upload_url(bucket))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        Ok(())
    }

    fn describe(&self) -> String {
        format!("gcs:{}", self.endpoint)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_object_name() {
        assert_eq!(object_name("", "a.json"), "a.json");
        assert_eq!(object_name("raw", "a.json"), "raw/a.json");
        assert_eq!(object_name("/raw/2021/", "a.json"), "raw/2021/a.json");
    }

    #[tokio::test]
    async fn test_local_store_copies_into_bucket_folder() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.json");
        std::fs::write(&source, b"[1,2,3]").unwrap();

        let store = LocalStore::new(dir.path().join("store"));
        store.put("tweets", "raw/a.json", &source).await.unwrap();

        let target = store.object_path("tweets", "raw/a.json");
        assert_eq!(std::fs::read(&target).unwrap(), b"[1,2,3]");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_local_store_missing_source() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("store"));
        let err = store
            .put("tweets", "a.json", &dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_gcs_upload_url() {
        let store = GcsStore::new("https://storage.googleapis.com/", "token").unwrap();
        assert_eq!(
            store.upload_url("tweets"),
            "https://storage.googleapis.com/upload/storage/v1/b/tweets/o"
        );
        assert_eq!(store.describe(), "gcs:https://storage.googleapis.com");
    }

    #[test]
    fn test_build_store_from_config() {
        let store = build_store(&StoreConfig::Local {
            path: PathBuf::from("/mnt/backup"),
        })
        .unwrap();
        assert_eq!(store.describe(), "local:/mnt/backup");
    }
}
