#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Two-stage transfer of a local CSV file into a Redshift table.
//!
//! 1. **Storage stage** ([`Pipeline::transfer_to_storage`]): upload the
//!    file into an S3 bucket under its base name.
//! 2. **Warehouse stage** ([`Pipeline::load_to_warehouse`]): check the
//!    bucket and target schema, recreate the destination table from an
//!    operator-written column fragment, confirm it exists, then `COPY`
//!    the object into it.
//!
//! Every precondition failure stops the pipeline with a [`PipelineError`].
//! Nothing is rolled back: a failed load leaves the uploaded object in
//! the bucket. A failed upload is handled per [`UploadFailurePolicy`].
//!
//! Nothing here coordinates concurrent runs. Two pipelines writing the
//! same destination table can interleave their `DROP`/`CREATE` and `COPY`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redshift_loader_credentials::CredentialSet;
use redshift_loader_s3::{BucketName, S3Client, S3Config, S3Error, StorageGateway, UploadOutcome};
use redshift_loader_warehouse::{
    Catalog, ConnectionPool, CopyCredentials, CopyStatement, DestinationTable, PostgresConnector,
    WarehouseCredentials, WarehouseError, ddl,
};
use strum_macros::{AsRefStr, Display, EnumString};

#[cfg(test)]
mod fakes;

/// Bucket used when the caller does not name one.
pub const DEFAULT_BUCKET: &str = "s3://ai-hotel/";

/// Errors that stop the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The bucket does not exist.
    #[error("S3 bucket not found: {bucket}")]
    BucketNotFound {
        /// Bucket as supplied.
        bucket: String,
    },

    /// The destination schema does not exist. Schemas are never created.
    #[error("Expected schema {schema} to exist, but it doesn't")]
    SchemaNotFound {
        /// Schema name.
        schema: String,
    },

    /// The destination table is missing after `CREATE TABLE`.
    #[error("Import table {table} does not exist")]
    TableNotCreated {
        /// Destination table.
        table: String,
    },

    /// The upload failed and the policy does not allow loading anyway.
    #[error("Upload of {key} failed: {cause}")]
    UploadFailed {
        /// Object key.
        key: String,
        /// Failure cause reported by the storage stage.
        cause: String,
    },

    /// Object storage error.
    #[error(transparent)]
    Storage(#[from] S3Error),

    /// Warehouse error.
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// What [`Pipeline::run`] does after a failed upload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum UploadFailurePolicy {
    /// Stop with [`PipelineError::UploadFailed`].
    Abort,
    /// Load anyway if an object from an earlier upload is already under
    /// the key; otherwise stop.
    #[default]
    ProceedIfPresent,
    /// Always load anyway. The load fails downstream if the object never
    /// arrived.
    Proceed,
}

/// Tunables for a [`Pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Handling of failed uploads.
    pub upload_failure: UploadFailurePolicy,
    /// Log the destination row count after the load.
    pub report_rows: bool,
    /// Bucket region passed to `COPY`, if any.
    pub region: Option<String>,
}

/// One invocation's inputs.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Directory holding the data file and the column fragment.
    pub source_dir: PathBuf,
    /// CSV file name inside `source_dir`.
    pub source_file: String,
    /// Column-definition fragment file name inside `source_dir`.
    pub table_schema_file: String,
    /// Logical warehouse database name.
    pub dest_db: String,
    /// Destination table as `schema.table`.
    pub dest_table: String,
    /// Bucket, with or without `s3://` and trailing `/`.
    pub bucket: String,
}

/// The S3-to-Redshift pipeline.
pub struct Pipeline {
    storage: StorageGateway,
    pool: Arc<ConnectionPool>,
    catalog: Catalog,
    copy_credentials: CopyCredentials,
    options: PipelineOptions,
}

impl Pipeline {
    /// Assembles a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        storage: StorageGateway,
        pool: Arc<ConnectionPool>,
        copy_credentials: CopyCredentials,
        options: PipelineOptions,
    ) -> Self {
        Self {
            storage,
            catalog: Catalog::new(pool.clone()),
            pool,
            copy_credentials,
            options,
        }
    }

    /// Builds the production pipeline from the S3 and Redshift credential
    /// sets. The S3 region, when given, is also passed to `COPY`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a required credential key is missing or
    /// invalid.
    pub fn from_credentials(
        s3: &CredentialSet,
        warehouse: &CredentialSet,
        mut options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        let s3_config = S3Config::from_credentials(s3)?;
        let warehouse = WarehouseCredentials::from_credentials(warehouse).map_err(WarehouseError::from)?;

        if options.region.is_none() {
            options.region = s3.get("AWS_REGION").map(str::to_string);
        }

        let copy_credentials = CopyCredentials {
            access_key_id: s3_config.access_key_id.clone(),
            secret_access_key: s3_config.secret_access_key.clone(),
        };
        let storage = StorageGateway::new(Arc::new(S3Client::new(&s3_config)));
        let pool = Arc::new(ConnectionPool::new(Box::new(PostgresConnector::new(warehouse))));

        Ok(Self::new(storage, pool, copy_credentials, options))
    }

    /// The connection pool, for closing connections at shutdown.
    #[must_use]
    pub const fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Uploads `source_dir/source_file` into `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BucketNotFound`] if the bucket does not
    /// exist, [`PipelineError::Storage`] for unusable bucket or file names.
    /// Upload failures are returned as [`UploadOutcome::Failed`].
    pub async fn transfer_to_storage(
        &self,
        source_dir: &Path,
        source_file: &str,
        bucket: &str,
    ) -> Result<UploadOutcome, PipelineError> {
        match self.storage.upload(source_dir, source_file, bucket).await {
            Err(S3Error::BucketNotFound { .. }) => Err(PipelineError::BucketNotFound {
                bucket: bucket.to_string(),
            }),
            other => other.map_err(PipelineError::from),
        }
    }

    /// Recreates the destination table and bulk-loads the uploaded object
    /// into it.
    ///
    /// No SQL is issued unless the bucket exists and `dest_table` is a
    /// valid `schema.table` reference. The table is only created inside an
    /// existing schema, and the load only runs once the table is confirmed.
    /// A failed row count after the load is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BucketNotFound`],
    /// [`PipelineError::SchemaNotFound`] or
    /// [`PipelineError::TableNotCreated`] on unmet preconditions, and
    /// [`PipelineError::Warehouse`] for malformed destinations, unreadable
    /// fragments and SQL failures.
    pub async fn load_to_warehouse(&self, request: &LoadRequest) -> Result<(), PipelineError> {
        if !self.storage.bucket_exists(&request.bucket).await {
            return Err(PipelineError::BucketNotFound {
                bucket: request.bucket.clone(),
            });
        }

        let bucket = BucketName::parse(&request.bucket)?;
        let key = redshift_loader_s3::object_key(&request.source_file)?;
        let dest = DestinationTable::parse(&request.dest_table)?;
        let db = request.dest_db.as_str();

        if !self.catalog.schema_exists(dest.schema(), db).await? {
            return Err(PipelineError::SchemaNotFound {
                schema: dest.schema().to_string(),
            });
        }

        let create = ddl::build_create_statement(&request.source_dir, &request.table_schema_file, &dest)?;
        log::info!("Creating table {dest} based on CSV schema found...");
        self.pool.execute(&create, db, false).await?;

        if !self.catalog.table_exists(dest.schema(), dest.table(), db).await? {
            return Err(PipelineError::TableNotCreated {
                table: dest.to_string(),
            });
        }
        log::info!("New Table Created!");

        let source_uri = bucket.object_uri(&key);
        let copy = CopyStatement {
            table: &dest,
            source_uri: &source_uri,
            credentials: &self.copy_credentials,
            region: self.options.region.as_deref(),
        };

        log::info!("Transferring data from S3 to Redshift now...");
        self.pool.execute(&copy.to_sql(), db, true).await?;
        log::info!("Redshift Transfer Complete!");

        if self.options.report_rows {
            match self.catalog.count_rows(&dest, db).await {
                Ok(rows) => log::info!("Found {rows} total rows in transferred table: {dest}"),
                Err(e) => log::warn!("Could not count rows in {dest}: {e}"),
            }
        }

        Ok(())
    }

    /// Runs both stages in order. A malformed `dest_table` is rejected
    /// before anything is uploaded.
    ///
    /// # Errors
    ///
    /// Returns the first [`PipelineError`] from either stage, or
    /// [`PipelineError::UploadFailed`] when the upload failed and the
    /// [`UploadFailurePolicy`] does not allow continuing.
    pub async fn run(&self, request: &LoadRequest) -> Result<(), PipelineError> {
        DestinationTable::parse(&request.dest_table)?;

        log::info!(
            "Copying {} to S3 bucket {}...",
            request.source_dir.join(&request.source_file).display(),
            request.bucket
        );
        let outcome = self
            .transfer_to_storage(&request.source_dir, &request.source_file, &request.bucket)
            .await?;

        if let UploadOutcome::Failed { bucket, key, cause } = outcome {
            self.handle_failed_upload(&bucket, key, cause).await?;
        }

        log::info!(
            "Copying {} from S3 bucket {} to Redshift destination {}...",
            request.source_file,
            request.bucket,
            request.dest_table
        );
        self.load_to_warehouse(request).await
    }

    async fn handle_failed_upload(
        &self,
        bucket: &BucketName,
        key: String,
        cause: String,
    ) -> Result<(), PipelineError> {
        match self.options.upload_failure {
            UploadFailurePolicy::Abort => Err(PipelineError::UploadFailed { key, cause }),
            UploadFailurePolicy::Proceed => {
                log::warn!("Upload of {key} failed; loading anyway");
                Ok(())
            }
            UploadFailurePolicy::ProceedIfPresent => {
                if self.storage.object_exists(bucket.name(), &key).await? {
                    log::warn!("Upload of {key} failed; loading the copy already in s3://{bucket}");
                    Ok(())
                } else {
                    Err(PipelineError::UploadFailed { key, cause })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::fakes::{Table, World};

    const FRAGMENT: &str = "id INT, name VARCHAR(50), amount FLOAT\n";
    const CSV: &str = "id,name,amount\n1,Ritz,\n2,  ,12.5\n";

    fn request(name: &str, dest_table: &str) -> LoadRequest {
        let dir = std::env::temp_dir().join(format!("redshift_loader_pipeline_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hotels.csv"), CSV).unwrap();
        std::fs::write(dir.join("hotels.sql"), FRAGMENT).unwrap();

        LoadRequest {
            source_dir: dir,
            source_file: "hotels.csv".to_string(),
            table_schema_file: "hotels.sql".to_string(),
            dest_db: "dev".to_string(),
            dest_table: dest_table.to_string(),
            bucket: "s3://ai-hotel/".to_string(),
        }
    }

    fn ready_world() -> World {
        let world = World::default();
        world.with(|w| {
            w.buckets.insert("ai-hotel".to_string());
            w.schemas.insert("staging".to_string());
        });
        world
    }

    fn options(upload_failure: UploadFailurePolicy) -> PipelineOptions {
        PipelineOptions {
            upload_failure,
            report_rows: true,
            region: None,
        }
    }

    fn cleanup(request: &LoadRequest) {
        let _ = std::fs::remove_dir_all(&request.source_dir);
    }

    #[tokio::test]
    async fn run_uploads_creates_and_loads_with_nulls() {
        let world = ready_world();
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("end_to_end", "staging.hotels");

        pipeline.run(&request).await.unwrap();

        world.with(|w| {
            assert_eq!(
                w.objects.get(&("ai-hotel".to_string(), "hotels.csv".to_string())),
                Some(&CSV.as_bytes().to_vec())
            );
            let table = &w.tables["staging.hotels"];
            assert_eq!(table.columns, ["id", "name", "amount"]);
            assert_eq!(
                table.rows,
                vec![
                    vec![Some("1".to_string()), Some("Ritz".to_string()), None],
                    vec![Some("2".to_string()), None, Some("12.5".to_string())],
                ]
            );
            assert_eq!(w.connects, 1);
        });

        cleanup(&request);
    }

    #[tokio::test]
    async fn copy_reads_prefixed_bucket_and_base_name_key() {
        let world = ready_world();
        let pipeline = world.pipeline(options(UploadFailurePolicy::Abort));
        let mut request = request("copy_source", "staging.hotels");
        request.bucket = "ai-hotel".to_string();

        pipeline.run(&request).await.unwrap();

        let copy = world.statements_containing("COPY");
        assert_eq!(copy.len(), 1);
        assert!(copy[0].starts_with("BEGIN;\nCOPY staging.hotels\n"));
        assert!(copy[0].contains("FROM 's3://ai-hotel/hotels.csv'"));
        assert!(copy[0].ends_with("COMMIT;"));

        cleanup(&request);
    }

    #[tokio::test]
    async fn reported_row_count_matches_load() {
        let world = ready_world();
        let pipeline = world.pipeline(options(UploadFailurePolicy::Abort));
        let request = request("row_report", "staging.hotels");

        pipeline.run(&request).await.unwrap();

        assert_eq!(
            world.statements_containing("COUNT(*)"),
            ["SELECT COUNT(*) FROM staging.hotels;"]
        );

        cleanup(&request);
    }

    #[tokio::test]
    async fn failed_row_count_does_not_fail_committed_load() {
        let world = ready_world();
        world.with(|w| w.fail_count = true);
        let pipeline = world.pipeline(options(UploadFailurePolicy::Abort));
        let request = request("count_failure", "staging.hotels");

        pipeline.run(&request).await.unwrap();

        assert_eq!(world.statements_containing("COUNT(*)").len(), 1);
        world.with(|w| assert_eq!(w.tables["staging.hotels"].rows.len(), 2));

        cleanup(&request);
    }

    #[tokio::test]
    async fn rerun_replaces_existing_table() {
        let world = ready_world();
        world.with(|w| {
            w.tables.insert(
                "staging.hotels".to_string(),
                Table {
                    columns: vec!["legacy".to_string()],
                    rows: vec![vec![Some("old".to_string())]],
                },
            );
        });
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("rerun", "staging.hotels");

        pipeline.run(&request).await.unwrap();
        pipeline.run(&request).await.unwrap();

        world.with(|w| {
            let table = &w.tables["staging.hotels"];
            assert_eq!(table.columns, ["id", "name", "amount"]);
            assert_eq!(table.rows.len(), 2);
        });

        cleanup(&request);
    }

    #[tokio::test]
    async fn missing_bucket_stops_run_before_upload_or_sql() {
        let world = World::default();
        world.with(|w| {
            w.schemas.insert("staging".to_string());
        });
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("no_bucket_run", "staging.hotels");

        let err = pipeline.run(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::BucketNotFound { .. }));
        world.with(|w| {
            assert_eq!(w.puts, 0);
            assert!(w.statements.is_empty());
            assert_eq!(w.connects, 0);
        });

        cleanup(&request);
    }

    #[tokio::test]
    async fn missing_bucket_stops_load_without_warehouse_calls() {
        let world = World::default();
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("no_bucket_load", "staging.hotels");

        let err = pipeline.load_to_warehouse(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::BucketNotFound { .. }));
        world.with(|w| {
            assert!(w.statements.is_empty());
            assert_eq!(w.connects, 0);
        });

        cleanup(&request);
    }

    #[tokio::test]
    async fn malformed_destination_is_rejected_before_sql() {
        let world = ready_world();
        let pipeline = world.pipeline(PipelineOptions::default());

        for dest in ["noschema", "a.b.c"] {
            let request = request("bad_dest", dest);
            let err = pipeline.load_to_warehouse(&request).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    PipelineError::Warehouse(WarehouseError::InvalidDestination { .. })
                ),
                "{dest}: {err}"
            );
            cleanup(&request);
        }

        world.with(|w| assert!(w.statements.is_empty()));
    }

    #[tokio::test]
    async fn malformed_destination_stops_run_before_upload() {
        let world = ready_world();
        let pipeline = world.pipeline(PipelineOptions::default());

        for dest in ["noschema", "a.b.c"] {
            let request = request("bad_dest_run", dest);
            let err = pipeline.run(&request).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    PipelineError::Warehouse(WarehouseError::InvalidDestination { .. })
                ),
                "{dest}: {err}"
            );
            cleanup(&request);
        }

        world.with(|w| {
            assert_eq!(w.puts, 0);
            assert!(w.objects.is_empty());
            assert!(w.statements.is_empty());
        });
    }

    #[tokio::test]
    async fn missing_schema_stops_before_create() {
        let world = ready_world();
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("no_schema", "reporting.hotels");

        let err = pipeline.load_to_warehouse(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::SchemaNotFound { schema } if schema == "reporting"));
        world.with(|w| {
            assert_eq!(w.statements.len(), 1);
            assert!(w.statements[0].contains("pg_namespace"));
        });

        cleanup(&request);
    }

    #[tokio::test]
    async fn table_missing_after_create_stops_before_copy() {
        let world = ready_world();
        world.with(|w| w.ignore_create = true);
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("create_ignored", "staging.hotels");

        let err = pipeline.load_to_warehouse(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::TableNotCreated { table } if table == "staging.hotels"));
        assert!(world.statements_containing("COPY").is_empty());

        cleanup(&request);
    }

    #[tokio::test]
    async fn missing_fragment_file_stops_before_create() {
        let world = ready_world();
        let pipeline = world.pipeline(PipelineOptions::default());
        let mut request = request("no_fragment", "staging.hotels");
        request.table_schema_file = "absent.sql".to_string();

        let err = pipeline.load_to_warehouse(&request).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Warehouse(WarehouseError::Fragment { .. })
        ));
        assert!(world.statements_containing("CREATE TABLE").is_empty());

        cleanup(&request);
    }

    #[tokio::test]
    async fn failed_upload_aborts_under_abort_policy() {
        let world = ready_world();
        world.with(|w| w.fail_put = true);
        let pipeline = world.pipeline(options(UploadFailurePolicy::Abort));
        let request = request("abort_policy", "staging.hotels");

        let err = pipeline.run(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::UploadFailed { key, .. } if key == "hotels.csv"));
        world.with(|w| assert!(w.statements.is_empty()));

        cleanup(&request);
    }

    #[tokio::test]
    async fn failed_upload_loads_earlier_object_when_present() {
        let world = ready_world();
        world.with(|w| {
            w.fail_put = true;
            w.objects.insert(
                ("ai-hotel".to_string(), "hotels.csv".to_string()),
                b"id,name,amount\n7,Savoy,99\n".to_vec(),
            );
        });
        let pipeline = world.pipeline(options(UploadFailurePolicy::ProceedIfPresent));
        let request = request("proceed_if_present", "staging.hotels");

        pipeline.run(&request).await.unwrap();

        world.with(|w| {
            assert_eq!(
                w.tables["staging.hotels"].rows,
                vec![vec![
                    Some("7".to_string()),
                    Some("Savoy".to_string()),
                    Some("99".to_string())
                ]]
            );
        });

        cleanup(&request);
    }

    #[tokio::test]
    async fn failed_upload_without_earlier_object_stops() {
        let world = ready_world();
        world.with(|w| w.fail_put = true);
        let pipeline = world.pipeline(options(UploadFailurePolicy::ProceedIfPresent));
        let request = request("proceed_if_absent", "staging.hotels");

        let err = pipeline.run(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::UploadFailed { .. }));
        world.with(|w| assert!(w.statements.is_empty()));

        cleanup(&request);
    }

    #[tokio::test]
    async fn proceed_policy_surfaces_load_error_downstream() {
        let world = ready_world();
        world.with(|w| w.fail_put = true);
        let pipeline = world.pipeline(options(UploadFailurePolicy::Proceed));
        let request = request("proceed_policy", "staging.hotels");

        let err = pipeline.run(&request).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Warehouse(WarehouseError::Execution { .. })
        ));
        assert_eq!(world.statements_containing("COPY").len(), 1);

        cleanup(&request);
    }

    #[tokio::test]
    async fn transfer_to_storage_reports_outcome() {
        let world = ready_world();
        let pipeline = world.pipeline(PipelineOptions::default());
        let request = request("transfer_only", "staging.hotels");

        let outcome = pipeline
            .transfer_to_storage(&request.source_dir, &request.source_file, "ai-hotel/")
            .await
            .unwrap();

        assert!(outcome.is_uploaded());
        assert_eq!(outcome.key(), "hotels.csv");
        world.with(|w| assert!(w.statements.is_empty()));

        cleanup(&request);
    }

    #[test]
    fn upload_failure_policy_parses_kebab_case() {
        assert_eq!(
            UploadFailurePolicy::from_str("proceed-if-present").unwrap(),
            UploadFailurePolicy::ProceedIfPresent
        );
        assert_eq!(UploadFailurePolicy::Abort.as_ref(), "abort");
        assert_eq!(UploadFailurePolicy::default(), UploadFailurePolicy::ProceedIfPresent);
        assert!(UploadFailurePolicy::from_str("retry").is_err());
    }
}
