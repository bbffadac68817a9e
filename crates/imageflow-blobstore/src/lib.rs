//! Blob Store Adapter: uploads raw bytes to an S3-compatible bucket under
//! a namespaced key and returns a durable, publicly-resolvable key/URL pair.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use imageflow_core::error::PipelineError;
use imageflow_core::models::StoredAsset;
use imageflow_core::traits::BlobStore;
use tracing::debug;
use uuid::Uuid;

/// S3-compatible implementation of [`BlobStore`].
///
/// Credentials and endpoint come from [`imageflow_core::Config`] rather
/// than the ambient AWS credential chain, since the configured bucket is
/// typically a non-AWS, S3-compatible service.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    folder: String,
    public_link: String,
}

impl S3BlobStore {
    pub fn new(
        endpoint_url: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        folder: &str,
        public_link: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "imageflow-static");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: bucket.to_owned(),
            folder: folder.trim_matches('/').to_owned(),
            public_link: public_link.trim_end_matches('/').to_owned(),
        }
    }
}

impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        prefix: &str,
        ext: Option<&str>,
    ) -> Result<StoredAsset, PipelineError> {
        let ext = ext
            .map(str::to_owned)
            .unwrap_or_else(|| mime.split('/').next_back().unwrap_or("bin").to_owned());
        let key = format!("{}/{prefix}/{}.{ext}", self.folder, Uuid::new_v4());

        debug!(key = %key, bucket = %self.bucket, "uploading object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(mime)
            .acl(aws_sdk_s3::types::ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let public_url = format!("{}/{key}", self.public_link);
        Ok(StoredAsset { key, public_url })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn public_url_is_resolved_against_configured_base() {
        let store = S3BlobStore::new(
            "https://s3.example.test",
            "auto",
            "key",
            "secret",
            "bucket",
            "internaluse",
            "https://cdn.example.test/",
        );
        assert_eq!(store.public_link, "https://cdn.example.test");
    }

    #[test]
    fn folder_strips_surrounding_slashes() {
        let store = S3BlobStore::new(
            "https://s3.example.test",
            "auto",
            "key",
            "secret",
            "bucket",
            "/internaluse/",
            "https://cdn.example.test",
        );
        assert_eq!(store.folder, "internaluse");
    }
}
