use ::s3::creds::Credentials;
use ::s3::{Bucket, Region};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use super::{sanitize_file_name, StorageError, StorageProvider, WriteTarget};

/// Longest presign lifetime S3 accepts (7 days).
const MAX_PRESIGN_SECS: u64 = 7 * 24 * 60 * 60;

/// S3-compatible object storage (AWS, R2, MinIO).
///
/// Supports direct write-back through presigned PUT URLs.
pub struct S3Storage {
    bucket: Box<Bucket>,
    prefix: String,
}

impl S3Storage {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        prefix: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    fn key(&self, area: &str, job_id: Uuid, name: &str) -> Result<String, StorageError> {
        Ok(object_key(
            &self.prefix,
            &[area, &job_id.to_string(), sanitize_file_name(name)?],
        ))
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code(), key)
    }
}

/// Join non-empty parts under an optional prefix.
fn object_key(prefix: &str, parts: &[&str]) -> String {
    std::iter::once(prefix)
        .chain(parts.iter().copied())
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn presign_secs(ttl: Duration) -> u32 {
    ttl.as_secs().clamp(1, MAX_PRESIGN_SECS) as u32
}

fn check_status(code: u16, key: &str) -> Result<(), StorageError> {
    match code {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        other => Err(StorageError::Status(other)),
    }
}

#[async_trait]
impl StorageProvider for S3Storage {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn persist_input(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        let key = self.key("uploads", job_id, name)?;
        self.put(&key, content, "application/octet-stream").await?;
        Ok(key)
    }

    async fn persist_output(
        &self,
        job_id: Uuid,
        name: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        let key = self.key("outputs", job_id, name)?;
        self.put(&key, content, "video/mp4").await?;
        Ok(key)
    }

    fn output_ref(&self, job_id: Uuid, name: &str) -> String {
        let name = sanitize_file_name(name).unwrap_or(super::OUTPUT_FILE_NAME);
        object_key(&self.prefix, &["outputs", &job_id.to_string(), name])
    }

    async fn build_reference_url(
        &self,
        asset_ref: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let url = self
            .bucket
            .presign_get(asset_ref, presign_secs(ttl), None)
            .await
            .map_err(StorageError::S3)?;
        Ok(url)
    }

    async fn build_write_target(
        &self,
        job_id: Uuid,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<WriteTarget>, StorageError> {
        let output_ref = self.output_ref(job_id, name);
        let upload_url = self
            .bucket
            .presign_put(&output_ref, presign_secs(ttl), None, None)
            .await
            .map_err(StorageError::S3)?;
        let output_url = self.build_reference_url(&output_ref, ttl).await?;

        Ok(Some(WriteTarget {
            upload_url,
            output_ref,
            output_url,
        }))
    }

    async fn read(&self, asset_ref: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(asset_ref)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code(), asset_ref)?;
        Ok(response.to_vec())
    }
}
