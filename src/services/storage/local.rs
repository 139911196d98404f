use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{sanitize_file_name, StorageError, StorageProvider};
use crate::config::ASSETS_PATH;
use crate::services::signing::AssetSigner;

/// Filesystem storage under a data root.
///
/// Reference URLs point back at this service's asset route and carry a signed
/// token for the absolute file path.
pub struct LocalStorage {
    data_root: PathBuf,
    uploads_root: PathBuf,
    outputs_root: PathBuf,
    public_base_url: String,
    signer: Arc<AssetSigner>,
}

impl LocalStorage {
    pub fn new(
        data_root: impl AsRef<Path>,
        public_base_url: &str,
        signer: Arc<AssetSigner>,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_root.as_ref())?;
        let data_root = std::fs::canonicalize(data_root.as_ref())?;
        let uploads_root = data_root.join("uploads");
        let outputs_root = data_root.join("outputs");
        std::fs::create_dir_all(&uploads_root)?;
        std::fs::create_dir_all(&outputs_root)?;

        Ok(Self {
            data_root,
            uploads_root,
            outputs_root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Verify an asset token and return the file it grants access to.
    pub async fn resolve_token(&self, token: &str) -> Result<PathBuf, StorageError> {
        let location = self.signer.verify(token)?;
        let path = tokio::fs::canonicalize(&location).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(location.clone())
            } else {
                StorageError::Io(e)
            }
        })?;

        if !path.starts_with(&self.data_root) {
            tracing::warn!(location = %location, "Asset token points outside data root");
            return Err(StorageError::NotFound(location));
        }
        Ok(path)
    }

    async fn write(&self, root: &Path, job_id: Uuid, name: &str, content: &[u8]) -> Result<String, StorageError> {
        let dir = root.join(job_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let target = dir.join(sanitize_file_name(name)?);
        tokio::fs::write(&target, content).await?;
        Ok(target.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn persist_input(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        self.write(&self.uploads_root, job_id, name, content).await
    }

    async fn persist_output(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        self.write(&self.outputs_root, job_id, name, content).await
    }

    fn output_ref(&self, job_id: Uuid, name: &str) -> String {
        let name = sanitize_file_name(name).unwrap_or(super::OUTPUT_FILE_NAME);
        self.outputs_root
            .join(job_id.to_string())
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    async fn build_reference_url(
        &self,
        asset_ref: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let token = self.signer.sign(asset_ref, ttl)?;
        Ok(format!("{}{}/{}", self.public_base_url, ASSETS_PATH, token))
    }

    async fn read(&self, asset_ref: &str) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(asset_ref).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(asset_ref.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }
}
