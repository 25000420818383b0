#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the S3 to Redshift loader.
//!
//! ```text
//! redshift_loader run data hotels.csv hotels.sql staging.hotels --bucket s3://ai-hotel/
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use redshift_loader_credentials::{CredentialSet, DEFAULT_CREDENTIAL_DIR};
use redshift_loader_pipeline::{
    DEFAULT_BUCKET, LoadRequest, Pipeline, PipelineError, PipelineOptions, UploadFailurePolicy,
};
use redshift_loader_s3::{S3Client, StorageGateway, UploadOutcome};
use redshift_loader_warehouse::WarehouseCredentials;

#[derive(Parser)]
#[command(
    name = "redshift_loader",
    about = "Copy a local CSV file to S3, then load it into a Redshift table"
)]
struct Cli {
    /// Directory holding the credential files
    #[arg(long, global = true, default_value = DEFAULT_CREDENTIAL_DIR)]
    credentials_dir: PathBuf,
    /// Name of the S3 credential file (without `.txt`)
    #[arg(long, global = true, default_value = "s3_creds")]
    s3_credentials: String,
    /// Name of the Redshift credential file (without `.txt`)
    #[arg(long, global = true, default_value = "redshift_creds")]
    redshift_credentials: String,
    /// What to do when the upload fails: abort, proceed-if-present or proceed
    #[arg(
        long,
        global = true,
        default_value_t = UploadFailurePolicy::default(),
        value_parser = parse_policy
    )]
    upload_failure: UploadFailurePolicy,
    /// Skip the row count after loading
    #[arg(long, global = true)]
    no_row_report: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the file to S3, then load it into Redshift
    Run(LoadArgs),
    /// Load a file that is already in S3 into Redshift
    Load(LoadArgs),
    /// Upload the file to S3 only
    Upload {
        /// Directory holding the data file
        source_dir: PathBuf,
        /// CSV file name inside `source_dir`
        source_file: String,
        /// Destination bucket
        #[arg(long, default_value = DEFAULT_BUCKET)]
        bucket: String,
    },
    /// Check whether a bucket exists
    BucketExists {
        /// Bucket, with or without `s3://`
        bucket: String,
    },
}

#[derive(Args)]
struct LoadArgs {
    /// Directory holding the data file and the table schema file
    source_dir: PathBuf,
    /// CSV file name inside `source_dir`
    source_file: String,
    /// Column-definition fragment file name inside `source_dir`
    table_schema_file: String,
    /// Destination table as `schema.table`
    dest_table: String,
    /// Warehouse database (defaults to `DATABASE` from the Redshift credentials)
    #[arg(long)]
    dest_db: Option<String>,
    /// Source bucket
    #[arg(long, default_value = DEFAULT_BUCKET)]
    bucket: String,
}

fn parse_policy(value: &str) -> Result<UploadFailurePolicy, String> {
    UploadFailurePolicy::from_str(value).map_err(|_| {
        format!("unknown upload failure policy {value:?} (expected abort, proceed-if-present or proceed)")
    })
}

impl Cli {
    fn read_s3(&self) -> Result<CredentialSet, Box<dyn std::error::Error>> {
        Ok(redshift_loader_credentials::read(
            &self.s3_credentials,
            &self.credentials_dir,
        )?)
    }

    fn read_redshift(&self) -> Result<CredentialSet, Box<dyn std::error::Error>> {
        Ok(redshift_loader_credentials::read(
            &self.redshift_credentials,
            &self.credentials_dir,
        )?)
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            upload_failure: self.upload_failure,
            report_rows: !self.no_row_report,
            region: None,
        }
    }

    fn gateway(&self) -> Result<StorageGateway, Box<dyn std::error::Error>> {
        let s3 = self.read_s3()?;
        Ok(StorageGateway::new(Arc::new(S3Client::from_credentials(
            &s3,
        )?)))
    }
}

impl LoadArgs {
    fn to_request(
        &self,
        redshift: &CredentialSet,
    ) -> Result<LoadRequest, Box<dyn std::error::Error>> {
        let dest_db = match &self.dest_db {
            Some(db) => db.clone(),
            None => WarehouseCredentials::from_credentials(redshift)?.database,
        };

        Ok(LoadRequest {
            source_dir: self.source_dir.clone(),
            source_file: self.source_file.clone(),
            table_schema_file: self.table_schema_file.clone(),
            dest_db,
            dest_table: self.dest_table.clone(),
            bucket: self.bucket.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::BucketExists { bucket } => {
            println!("{}", cli.gateway()?.bucket_exists(bucket).await);
        }
        Commands::Upload {
            source_dir,
            source_file,
            bucket,
        } => {
            upload(&cli.gateway()?, source_dir, source_file, bucket).await?;
        }
        Commands::Run(args) => {
            let (pipeline, request) = prepare(&cli, args)?;

            let result = pipeline.run(&request).await;
            pipeline.pool().close_all().await;
            result?;
        }
        Commands::Load(args) => {
            let (pipeline, request) = prepare(&cli, args)?;

            let result = pipeline.load_to_warehouse(&request).await;
            pipeline.pool().close_all().await;
            result?;
        }
    }

    Ok(())
}

fn prepare(
    cli: &Cli,
    args: &LoadArgs,
) -> Result<(Pipeline, LoadRequest), Box<dyn std::error::Error>> {
    let s3 = cli.read_s3()?;
    let redshift = cli.read_redshift()?;
    let request = args.to_request(&redshift)?;
    let pipeline = Pipeline::from_credentials(&s3, &redshift, cli.options())?;
    Ok((pipeline, request))
}

async fn upload(
    gateway: &StorageGateway,
    source_dir: &Path,
    source_file: &str,
    bucket: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!(
        "Copying {} to S3 bucket {bucket}...",
        source_dir.join(source_file).display()
    );

    match gateway.upload(source_dir, source_file, bucket).await? {
        UploadOutcome::Uploaded { bucket, key } => {
            log::info!("Uploaded {}", bucket.object_uri(&key));
            Ok(())
        }
        UploadOutcome::Failed { key, cause, .. } => {
            Err(PipelineError::UploadFailed { key, cause }.into())
        }
    }
}
