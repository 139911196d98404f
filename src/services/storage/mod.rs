//! Byte stores for job inputs and outputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::services::signing::SigningError;

pub mod local;
pub mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

/// File name every job output is stored under.
pub const OUTPUT_FILE_NAME: &str = "result.mp4";

/// Destination the remote backend can upload the output to directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteTarget {
    pub upload_url: String,
    pub output_ref: String,
    pub output_url: String,
}

/// Storage capability consumed by the orchestrator.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn persist_input(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError>;

    async fn persist_output(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError>;

    /// Location an output named `name` of `job_id` is (or would be) stored at.
    fn output_ref(&self, job_id: Uuid, name: &str) -> String;

    /// Time-limited URL the remote backend can fetch `asset_ref` from.
    async fn build_reference_url(
        &self,
        asset_ref: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;

    /// Direct write-back target, for backends that support one.
    async fn build_write_target(
        &self,
        _job_id: Uuid,
        _name: &str,
        _ttl: Duration,
    ) -> Result<Option<WriteTarget>, StorageError> {
        Ok(None)
    }

    async fn read(&self, asset_ref: &str) -> Result<Vec<u8>, StorageError>;
}

/// Final path component of a client-supplied name.
pub(crate) fn sanitize_file_name(name: &str) -> Result<&str, StorageError> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StorageError::InvalidName(name.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] ::s3::error::S3Error),

    #[error("S3 returned status {0}")]
    Status(u16),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset token rejected: {0}")]
    Token(#[from] SigningError),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("invalid asset name: {0:?}")]
    InvalidName(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
