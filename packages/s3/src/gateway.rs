//! Bucket existence checks and best-effort file upload.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::{BucketName, BucketProbe, ObjectStore, S3Error, object_key};

/// Bounded existence poll run after each upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of existence checks.
    pub attempts: u32,
    /// Delay between checks.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_secs(5),
        }
    }
}

/// Outcome of [`StorageGateway::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The object was uploaded and confirmed present.
    Uploaded {
        /// Normalized bucket.
        bucket: BucketName,
        /// Object key.
        key: String,
    },
    /// The upload or its confirmation failed. Already logged.
    Failed {
        /// Normalized bucket.
        bucket: BucketName,
        /// Object key.
        key: String,
        /// Human-readable failure cause.
        cause: String,
    },
}

impl UploadOutcome {
    /// Whether the object was confirmed present.
    #[must_use]
    pub const fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    /// The object key the file was (or would have been) stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Uploaded { key, .. } | Self::Failed { key, .. } => key,
        }
    }
}

/// Object storage operations used by the pipeline.
#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    poll: PollConfig,
}

impl StorageGateway {
    /// Wraps a low-level store with the default poll configuration.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            poll: PollConfig::default(),
        }
    }

    /// Overrides the post-upload existence poll.
    #[must_use]
    pub const fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Returns whether `bucket` exists.
    ///
    /// An access-denied probe counts as existing, since existence cannot
    /// be disproven. Invalid names and any other probe failure count as
    /// absent.
    pub async fn bucket_exists(&self, bucket: &str) -> bool {
        let Ok(bucket) = BucketName::parse(bucket) else {
            log::warn!("Invalid bucket name: {bucket:?}");
            return false;
        };

        match self.store.probe_bucket(bucket.name()).await {
            BucketProbe::Found => true,
            BucketProbe::Forbidden => {
                log::warn!("Insufficient credentials to access existing bucket {bucket}.");
                true
            }
            BucketProbe::NotFound => false,
            BucketProbe::Failed(cause) => {
                log::warn!("Could not check bucket {bucket}: {cause}");
                false
            }
        }
    }

    /// Returns whether `key` is present in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::InvalidBucket`] for an empty bucket identifier
    /// and [`S3Error::Head`] if the check itself fails.
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, S3Error> {
        let bucket = BucketName::parse(bucket)?;
        self.store.object_exists(bucket.name(), key).await
    }

    /// Uploads `local_dir/local_file` into `bucket` under the file's base
    /// name, then waits for the object to become visible.
    ///
    /// Upload and confirmation failures are logged and reported as
    /// [`UploadOutcome::Failed`] rather than returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::BucketNotFound`] if the bucket does not exist,
    /// [`S3Error::InvalidBucket`] or [`S3Error::InvalidKey`] for unusable
    /// identifiers.
    pub async fn upload(
        &self,
        local_dir: &Path,
        local_file: &str,
        bucket: &str,
    ) -> Result<UploadOutcome, S3Error> {
        let bucket = BucketName::parse(bucket)?;

        if !self.bucket_exists(bucket.name()).await {
            return Err(S3Error::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }

        let key = object_key(local_file)?;
        let path = local_dir.join(local_file);

        let outcome = match self.transfer(&bucket, &key, &path).await {
            Ok(()) => UploadOutcome::Uploaded { bucket, key },
            Err(e) => {
                log::error!("Could not upload file to S3 bucket - {e}");
                UploadOutcome::Failed {
                    bucket,
                    key,
                    cause: e.to_string(),
                }
            }
        };

        log::info!("S3 Transfer Complete!");
        Ok(outcome)
    }

    async fn transfer(&self, bucket: &BucketName, key: &str, path: &Path) -> Result<(), S3Error> {
        self.store.put_file(bucket.name(), key, path).await?;
        self.wait_until_exists(bucket, key).await
    }

    async fn wait_until_exists(&self, bucket: &BucketName, key: &str) -> Result<(), S3Error> {
        for attempt in 1..=self.poll.attempts {
            if self.store.object_exists(bucket.name(), key).await? {
                return Ok(());
            }
            log::debug!(
                "  s3://{bucket}/{key} not visible yet ({attempt}/{})",
                self.poll.attempts
            );
            if attempt < self.poll.attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        Err(S3Error::NotConfirmed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            attempts: self.poll.attempts,
        })
    }
}
