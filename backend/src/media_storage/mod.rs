//! S3-based video storage operations
mod error;

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use aws_sdk_s3::{
    error::SdkError, operation::head_object::HeadObjectError, presigning::PresigningConfig,
    Client as S3Client,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub use error::{BucketError, BucketResult};

/// Prefix for every object uploaded through a signed URL
const UPLOAD_PREFIX: &str = "uploads";

static UNSAFE_KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.-]").expect("static regex is valid"));

/// Presigned URL with expiration information
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// The presigned URL for PUT operations
    pub url: String,
    /// ISO-8601 UTC timestamp when the URL expires
    pub expires_at: DateTime<Utc>,
}

/// Everything a client needs to upload a video straight to storage
#[derive(Debug, Clone)]
pub struct SignedUpload {
    pub signed_url: String,
    pub object_key: String,
    pub bucket_name: String,
    pub storage_uri: String,
    pub expires_at: DateTime<Utc>,
}

/// Blob store used by the large-file path
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Configured bucket, `None` when storage is not configured
    fn bucket_name(&self) -> Option<&str>;

    /// Canonical URI of an object, as handed to the inference vendor
    fn storage_uri(&self, object_key: &str) -> Option<String> {
        self.bucket_name()
            .map(|bucket| format!("s3://{bucket}/{object_key}"))
    }

    /// Size of an object in bytes, `None` if it does not exist
    async fn object_size(&self, object_key: &str) -> BucketResult<Option<u64>>;

    /// Generates a presigned PUT URL bound to `content_type`
    async fn generate_presigned_put_url(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> BucketResult<PresignedUrl>;

    /// Streams an object into a local file, returning the bytes written
    async fn download_to_file(&self, object_key: &str, destination: &Path) -> BucketResult<u64>;

    /// Deletes an object
    async fn delete_object(&self, object_key: &str) -> BucketResult<()>;
}

/// Replaces every character outside `[A-Za-z0-9.-]` with `_`
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    UNSAFE_KEY_CHARS.replace_all(file_name, "_").into_owned()
}

/// Builds a collision-resistant object key for an upload
#[must_use]
pub fn object_key_for(file_name: &str) -> String {
    format!(
        "{UPLOAD_PREFIX}/{}-{}",
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

/// Issues a signed upload for `file_name`
///
/// # Errors
///
/// Returns `BucketError::ConfigError` if no bucket is configured, before any network call
/// Returns `BucketError::InvalidInput` if the file name or content type is unusable
/// Returns `BucketError::S3Error` if presigning fails
pub async fn issue_signed_upload(
    store: &dyn ObjectStore,
    file_name: &str,
    content_type: &str,
) -> BucketResult<SignedUpload> {
    let bucket_name = store
        .bucket_name()
        .ok_or_else(|| BucketError::ConfigError("S3_BUCKET_NAME is not set".to_string()))?
        .to_string();

    if file_name.trim().is_empty() {
        return Err(BucketError::InvalidInput("file name is empty".to_string()));
    }
    content_type
        .parse::<mime::Mime>()
        .map_err(|e| BucketError::InvalidInput(format!("content type {content_type}: {e}")))?;

    let object_key = object_key_for(file_name);
    let presigned = store
        .generate_presigned_put_url(&object_key, content_type)
        .await?;

    tracing::info!(object_key, "Issued signed upload");

    Ok(SignedUpload {
        signed_url: presigned.url,
        storage_uri: format!("s3://{bucket_name}/{object_key}"),
        object_key,
        bucket_name,
        expires_at: presigned.expires_at,
    })
}

/// Video storage client for S3 operations
pub struct MediaStorage {
    s3_client: Arc<S3Client>,
    bucket_name: Option<String>,
    presigned_url_expiry_secs: u64,
}

impl MediaStorage {
    /// Creates a new media storage client
    ///
    /// # Arguments
    ///
    /// * `s3_client` - Pre-configured S3 client
    /// * `bucket_name` - S3 bucket for uploaded videos, `None` if not configured
    /// * `presigned_url_expiry_secs` - Expiry time for presigned URLs in seconds
    #[must_use]
    pub const fn new(
        s3_client: Arc<S3Client>,
        bucket_name: Option<String>,
        presigned_url_expiry_secs: u64,
    ) -> Self {
        Self {
            s3_client,
            bucket_name,
            presigned_url_expiry_secs,
        }
    }

    fn bucket(&self) -> BucketResult<&str> {
        self.bucket_name
            .as_deref()
            .ok_or_else(|| BucketError::ConfigError("S3_BUCKET_NAME is not set".to_string()))
    }
}

#[async_trait::async_trait]
impl ObjectStore for MediaStorage {
    fn bucket_name(&self) -> Option<&str> {
        self.bucket_name.as_deref()
    }

    /// # Errors
    ///
    /// Returns `BucketError::S3Error` for S3 service errors
    /// Returns `BucketError::UpstreamError` for 5xx errors
    async fn object_size(&self, object_key: &str) -> BucketResult<Option<u64>> {
        let result = self
            .s3_client
            .head_object()
            .bucket(self.bucket()?)
            .key(object_key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(
                output
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or(0),
            )),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
            {
                Ok(None)
            }
            Err(SdkError::ServiceError(service_err))
                if service_err.raw().status().as_u16() >= 500 =>
            {
                Err(BucketError::UpstreamError(format!("{service_err:?}")))
            }
            Err(e) => Err(BucketError::from(e)),
        }
    }

    async fn generate_presigned_put_url(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> BucketResult<PresignedUrl> {
        let presigned_config =
            PresigningConfig::expires_in(Duration::from_secs(self.presigned_url_expiry_secs))
                .map_err(|e| {
                    BucketError::ConfigError(format!("Failed to create presigning config: {e}"))
                })?;

        let presigned_url = self
            .s3_client
            .put_object()
            .bucket(self.bucket()?)
            .key(object_key)
            .content_type(content_type)
            .presigned(presigned_config)
            .await
            .map_err(|e| BucketError::S3Error(format!("Failed to generate presigned URL: {e}")))?;

        let expires_at: DateTime<Utc> =
            Utc::now() + Duration::from_secs(self.presigned_url_expiry_secs);

        Ok(PresignedUrl {
            url: presigned_url.uri().to_string(),
            expires_at,
        })
    }

    async fn download_to_file(&self, object_key: &str, destination: &Path) -> BucketResult<u64> {
        let mut object = self
            .s3_client
            .get_object()
            .bucket(self.bucket()?)
            .key(object_key)
            .send()
            .await?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0_u64;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .map_err(|e| BucketError::AwsError(format!("Failed to read object body: {e}")))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn delete_object(&self, object_key: &str) -> BucketResult<()> {
        self.s3_client
            .delete_object()
            .bucket(self.bucket()?)
            .key(object_key)
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::{BucketError, BucketResult, ObjectStore, PresignedUrl};

    /// In-memory object store
    pub struct MockObjectStore {
        bucket_name: Option<String>,
        objects: Mutex<HashMap<String, Vec<u8>>>,
        deleted: Mutex<Vec<String>>,
    }

    impl MockObjectStore {
        #[must_use]
        pub fn new(bucket_name: Option<&str>) -> Self {
            Self {
                bucket_name: bucket_name.map(ToString::to_string),
                objects: Mutex::new(HashMap::new()),
                deleted: Mutex::new(Vec::new()),
            }
        }

        /// Stores an object as if a client had used its signed URL
        pub fn put(&self, object_key: &str, data: Vec<u8>) {
            self.objects
                .lock()
                .unwrap()
                .insert(object_key.to_string(), data);
        }

        #[must_use]
        pub fn contains(&self, object_key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(object_key)
        }

        #[must_use]
        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }

        fn require_bucket(&self) -> BucketResult<&str> {
            self.bucket_name
                .as_deref()
                .ok_or_else(|| BucketError::ConfigError("no bucket".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl ObjectStore for MockObjectStore {
        fn bucket_name(&self) -> Option<&str> {
            self.bucket_name.as_deref()
        }

        async fn object_size(&self, object_key: &str) -> BucketResult<Option<u64>> {
            self.require_bucket()?;
            Ok(self
                .objects
                .lock()
                .unwrap()
                .get(object_key)
                .map(|data| data.len() as u64))
        }

        async fn generate_presigned_put_url(
            &self,
            object_key: &str,
            content_type: &str,
        ) -> BucketResult<PresignedUrl> {
            let bucket = self.require_bucket()?;
            Ok(PresignedUrl {
                url: format!(
                    "https://storage.test/{bucket}/{object_key}?content-type={content_type}"
                ),
                expires_at: Utc::now() + chrono::Duration::minutes(15),
            })
        }

        async fn download_to_file(
            &self,
            object_key: &str,
            destination: &Path,
        ) -> BucketResult<u64> {
            let data = self
                .objects
                .lock()
                .unwrap()
                .get(object_key)
                .cloned()
                .ok_or_else(|| BucketError::NotFound(object_key.to_string()))?;
            tokio::fs::write(destination, &data).await?;
            Ok(data.len() as u64)
        }

        async fn delete_object(&self, object_key: &str) -> BucketResult<()> {
            self.objects.lock().unwrap().remove(object_key);
            self.deleted.lock().unwrap().push(object_key.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockObjectStore;
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("exame-01.mp4"), "exame-01.mp4");
        assert_eq!(sanitize_file_name("DISE paciente#3.mov"), "DISE_paciente_3.mov");
        assert_eq!(sanitize_file_name("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_file_name("vídeo.mp4"), "v_deo.mp4");
    }

    #[test]
    fn test_object_keys_are_unique() {
        let first = object_key_for("video.mp4");
        let second = object_key_for("video.mp4");
        assert_ne!(first, second);
        assert!(first.starts_with("uploads/"));
        assert!(first.ends_with("-video.mp4"));
    }

    #[tokio::test]
    async fn test_issue_signed_upload() {
        let store = MockObjectStore::new(Some("dise-test"));
        let upload = issue_signed_upload(&store, "exame 1.mp4", "video/mp4")
            .await
            .unwrap();

        assert_eq!(upload.bucket_name, "dise-test");
        assert!(upload.object_key.ends_with("-exame_1.mp4"));
        assert_eq!(
            upload.storage_uri,
            format!("s3://dise-test/{}", upload.object_key)
        );
        assert!(upload.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_issue_signed_upload_without_bucket() {
        let store = MockObjectStore::new(None);
        let result = issue_signed_upload(&store, "video.mp4", "video/mp4").await;
        assert!(matches!(result, Err(BucketError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_issue_signed_upload_rejects_bad_content_type() {
        let store = MockObjectStore::new(Some("dise-test"));
        let result = issue_signed_upload(&store, "video.mp4", "not a mime").await;
        assert!(matches!(result, Err(BucketError::InvalidInput(_))));
    }
}
