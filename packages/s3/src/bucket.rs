//! Bucket identifier normalization and object key derivation.

use std::path::Path;

use crate::S3Error;

/// URI scheme prefix for S3 locations.
pub const S3_SCHEME: &str = "s3://";

/// A normalized S3 bucket name.
///
/// Accepts `my-bucket`, `my-bucket/`, `s3://my-bucket` and
/// `s3://my-bucket/` and stores the bare name in each case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketName(String);

impl BucketName {
    /// Normalizes a bucket identifier.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::InvalidBucket`] if nothing is left after the
    /// scheme and trailing slashes are stripped.
    pub fn parse(raw: &str) -> Result<Self, S3Error> {
        let trimmed = raw.trim();
        let name = trimmed
            .strip_prefix(S3_SCHEME)
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        if name.is_empty() {
            return Err(S3Error::InvalidBucket {
                bucket: raw.to_string(),
            });
        }

        Ok(Self(name.to_string()))
    }

    /// The bare bucket name, as used by the S3 API.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The fully prefixed form, `s3://<name>`, without a trailing slash.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{S3_SCHEME}{}", self.0)
    }

    /// The `s3://<name>/<key>` location of an object in this bucket.
    #[must_use]
    pub fn object_uri(&self, key: &str) -> String {
        format!("{}/{key}", self.uri())
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the object key for a local file: its base name.
///
/// # Errors
///
/// Returns [`S3Error::InvalidKey`] if `local_file` has no file name
/// component (e.g. empty or ending in `..`).
pub fn object_key(local_file: &str) -> Result<String, S3Error> {
    let path = Path::new(local_file);
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| S3Error::InvalidKey {
            path: path.to_path_buf(),
        })
}
