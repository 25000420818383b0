#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! S3 access for the Redshift loader.
//!
//! The [`StorageGateway`] implements the decisions made around object
//! storage: bucket normalization, existence checks that tolerate
//! access-denied responses, and a best-effort upload that reports its
//! outcome instead of failing the pipeline. The raw S3 calls sit behind
//! the [`ObjectStore`] trait; [`S3Client`] is the AWS SDK implementation.
//!
//! # Credential keys
//!
//! | Key | Required | Description |
//! |---|---|---|
//! | `AWS_ACCESS_KEY_ID` | Yes | Access key id |
//! | `AWS_SECRET_ACCESS_ID` | Yes | Secret key (`AWS_SECRET_ACCESS_KEY` also accepted) |
//! | `AWS_REGION` | No | Bucket region, defaults to `us-east-1` |
//! | `AWS_ENDPOINT_URL` | No | S3-compatible endpoint, enables path-style addressing |

mod bucket;
mod client;
mod gateway;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use bucket::{BucketName, S3_SCHEME, object_key};
pub use client::{S3Client, S3Config};
pub use gateway::{PollConfig, StorageGateway, UploadOutcome};

/// Errors that can occur during S3 operations.
#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    /// Bucket identifier is empty after normalization.
    #[error("Invalid bucket name: {bucket:?}")]
    InvalidBucket {
        /// Identifier as supplied by the caller.
        bucket: String,
    },

    /// No object key can be derived from the local file name.
    #[error("Cannot derive an object key from {}", path.display())]
    InvalidKey {
        /// Local file path.
        path: PathBuf,
    },

    /// The bucket does not exist (or could not be confirmed).
    #[error("S3 bucket not found: {bucket}")]
    BucketNotFound {
        /// Normalized bucket name.
        bucket: String,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `HeadObject` failed.
    #[error("Failed to head s3://{bucket}/{key}: {source}")]
    Head {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The uploaded object never became visible.
    #[error("s3://{bucket}/{key} not found after {attempts} existence checks")]
    NotConfirmed {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Number of checks performed.
        attempts: u32,
    },

    /// I/O error reading local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential file problem.
    #[error("Credential error: {0}")]
    Credentials(#[from] redshift_loader_credentials::CredentialError),
}

/// Result of a `HeadBucket` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketProbe {
    /// The bucket exists and is accessible.
    Found,
    /// The bucket answered with access denied (HTTP 403).
    Forbidden,
    /// The bucket does not exist (HTTP 404).
    NotFound,
    /// Any other failure.
    Failed(String),
}

/// Low-level object storage operations.
///
/// Each call is a single attempt; no retries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Probes `bucket` (already normalized).
    async fn probe_bucket(&self, bucket: &str) -> BucketProbe;

    /// Uploads the file at `path` to `bucket` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::Upload`] on S3 failures, [`S3Error::Io`] if the
    /// local file cannot be read.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), S3Error>;

    /// Returns whether `key` exists in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::Head`] on failures other than not-found.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, S3Error>;
}
