//! AWS SDK implementation of [`ObjectStore`].

use std::path::Path;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use redshift_loader_credentials::CredentialSet;

use crate::{BucketProbe, ObjectStore, S3Error};

/// Region used when the credential file does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for [`S3Client`].
#[derive(Clone)]
pub struct S3Config {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Bucket region.
    pub region: String,
    /// Custom S3-compatible endpoint.
    pub endpoint_url: Option<String>,
}

impl S3Config {
    /// Builds the configuration from an S3 credential set.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::Credentials`] if the access key pair is missing.
    pub fn from_credentials(creds: &CredentialSet) -> Result<Self, S3Error> {
        Ok(Self {
            access_key_id: creds.require("AWS_ACCESS_KEY_ID")?.to_string(),
            secret_access_key: creds
                .require_any(&["AWS_SECRET_ACCESS_ID", "AWS_SECRET_ACCESS_KEY"])?
                .to_string(),
            region: creds.get("AWS_REGION").unwrap_or(DEFAULT_REGION).to_string(),
            endpoint_url: creds.get("AWS_ENDPOINT_URL").map(str::to_string),
        })
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish_non_exhaustive()
    }
}

/// S3 client backed by the AWS SDK.
pub struct S3Client {
    client: aws_sdk_s3::Client,
}

impl S3Client {
    /// Creates a client from explicit settings.
    #[must_use]
    pub fn new(config: &S3Config) -> Self {
        let creds = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "credential-file",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }

    /// Creates a client from an S3 credential set.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::Credentials`] if required keys are missing.
    pub fn from_credentials(creds: &CredentialSet) -> Result<Self, S3Error> {
        Ok(Self::new(&S3Config::from_credentials(creds)?))
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn probe_bucket(&self, bucket: &str) -> BucketProbe {
        let Err(err) = self.client.head_bucket().bucket(bucket).send().await else {
            return BucketProbe::Found;
        };

        if err
            .as_service_error()
            .is_some_and(HeadBucketError::is_not_found)
        {
            return BucketProbe::NotFound;
        }

        match err.raw_response().map(|r| r.status().as_u16()) {
            Some(403) => BucketProbe::Forbidden,
            Some(404) => BucketProbe::NotFound,
            _ => BucketProbe::Failed(err.to_string()),
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), S3Error> {
        let data = tokio::fs::read(path).await?;
        #[allow(clippy::cast_precision_loss)] // display-only MB value
        let mb = data.len() as f64 / 1_048_576.0;
        log::info!("Pushing {} -> s3://{bucket}/{key} ({mb:.1} MB)", path.display());

        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| S3Error::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        log::info!("  uploaded {key}");
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, S3Error> {
        let result = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    return Ok(false);
                }
                Err(S3Error::Head {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }
}
