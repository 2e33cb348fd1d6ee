use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::{
    error::{ProvideErrorMetadata, SdkError},
    operation::delete_object::DeleteObjectError,
};

use application::interfaces::storage::StemStorageClient;

use super::s3::{S3Config, build_s3_client};

#[derive(Debug, Clone)]
pub struct SupabaseStorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Removes separated stem files from the Supabase Storage bucket through its
/// S3-compatible API.
pub struct SupabaseStorageClient {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl SupabaseStorageClient {
    pub async fn new(config: SupabaseStorageConfig) -> Result<Self> {
        let client = build_s3_client(&S3Config::new(
            config.endpoint,
            config.region,
            config.access_key,
            config.secret_key,
        ))
        .await?;

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Supabase Storage S3-compatible API reference:
    /// https://supabase.com/docs/guides/storage/s3/compatibility
    pub async fn delete_object(&self, storage_path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
            .map_err(|err| map_delete_object_error(err, &self.bucket, storage_path))?;

        Ok(())
    }
}

#[async_trait]
impl StemStorageClient for SupabaseStorageClient {
    async fn delete_object(&self, storage_path: &str) -> Result<()> {
        SupabaseStorageClient::delete_object(self, storage_path).await
    }
}

fn map_delete_object_error(
    err: SdkError<DeleteObjectError>,
    bucket: &str,
    storage_path: &str,
) -> anyhow::Error {
    if let SdkError::ServiceError(service_err) = &err {
        let raw = service_err.raw();
        let status = raw.status().as_u16();
        let code = service_err.err().code().unwrap_or("unknown");
        let message = service_err.err().message().unwrap_or_default();
        let body = raw
            .body()
            .bytes()
            .map(|b| String::from_utf8_lossy(b).trim().to_owned())
            .filter(|b| !b.is_empty())
            .unwrap_or_default();

        let mut detail = format!(
            "failed to delete stem from Supabase Storage (status {}, code {})",
            status, code
        );

        if !message.is_empty() {
            detail.push_str(&format!(": {}", message));
        }

        detail.push_str(&format!(" [bucket={}, key={}]", bucket, storage_path));

        if !body.is_empty() {
            // Keep a short preview of the response body for debugging.
            let preview = body.chars().take(512).collect::<String>();
            detail.push_str(&format!("; body={}", preview));
        }

        return anyhow::anyhow!(detail);
    }

    anyhow::Error::new(err).context("failed to delete stem from Supabase Storage")
}
