//! Redshift `COPY` bulk-load batch.

use crate::DestinationTable;

/// Access key pair Redshift uses to read the S3 object.
#[derive(Clone)]
pub struct CopyCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

impl std::fmt::Debug for CopyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyCredentials").finish_non_exhaustive()
    }
}

/// A CSV `COPY` from one S3 location into a table.
#[derive(Debug, Clone)]
pub struct CopyStatement<'a> {
    /// Target table.
    pub table: &'a DestinationTable,
    /// Source location, `s3://bucket/key`.
    pub source_uri: &'a str,
    /// Key pair for the S3 read.
    pub credentials: &'a CopyCredentials,
    /// Region of the bucket, when it differs from the cluster's.
    pub region: Option<&'a str>,
}

impl CopyStatement<'_> {
    /// Renders the batch: one header row skipped, blank and empty fields
    /// loaded as `NULL`, wrapped in `BEGIN; ... COMMIT;`.
    ///
    /// The result embeds the secret key. Never log it.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let region = self
            .region
            .map(|r| format!("REGION '{r}'\n"))
            .unwrap_or_default();

        format!(
            "BEGIN;\n\
             COPY {table}\n\
             FROM '{source}'\n\
             ACCESS_KEY_ID '{access}'\n\
             SECRET_ACCESS_KEY '{secret}'\n\
             {region}\
             IGNOREHEADER 1\n\
             BLANKSASNULL\n\
             EMPTYASNULL\n\
             CSV;\n\
             COMMIT;",
            table = self.table,
            source = self.source_uri,
            access = self.credentials.access_key_id,
            secret = self.credentials.secret_access_key,
        )
    }
}
