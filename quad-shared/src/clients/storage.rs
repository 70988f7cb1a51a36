use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client as S3Client;

/// S3-compatible bucket holding user-uploaded images.
///
/// Uploads happen outside the services; records only keep object keys. The
/// services need to render keys as URLs and remove objects whose owning
/// record was deleted.
#[derive(Clone)]
pub struct ObjectStorage {
    client: S3Client,
    bucket: String,
    public_url: String,
}

impl ObjectStorage {
    pub async fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "quad");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = S3Client::from_conf(config);

        tracing::info!(endpoint = %endpoint, bucket = %bucket, "object storage client initialized");

        Self {
            client,
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        object_url(&self.public_url, &self.bucket, key)
    }

    pub async fn delete(&self, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| format!("delete failed: {e}"))?;

        Ok(())
    }

    /// Delete every key, returning how many deletions failed. Failures are
    /// logged and leave an orphaned object rather than failing the request.
    pub async fn delete_all(&self, keys: &[String]) -> usize {
        let mut failed = 0;
        for key in keys {
            if let Err(e) = self.delete(key).await {
                tracing::warn!(key = %key, error = %e, "failed to delete stored object");
                failed += 1;
            }
        }
        failed
    }
}

fn object_url(public_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", public_url, bucket, key.trim_start_matches('/'))
}
