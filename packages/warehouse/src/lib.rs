#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Redshift access for the Redshift loader.
//!
//! * [`pool`] keeps one cached connection per logical database name and
//!   runs raw SQL over it.
//! * [`catalog`] answers existence questions from `pg_namespace` and
//!   `pg_tables`.
//! * [`ddl`] turns an operator-written column fragment into a
//!   `DROP TABLE IF EXISTS ... CREATE TABLE ...` batch.
//! * [`copy`] renders the `COPY ... FROM 's3://...'` bulk-load batch.
//!
//! The column fragment, destination table and bucket are interpolated
//! into SQL text verbatim. They must come from the operator running the
//! load, never from end users.

pub mod catalog;
pub mod copy;
pub mod ddl;
pub mod pool;
pub mod session;
pub mod table;

use std::path::PathBuf;

pub use catalog::Catalog;
pub use copy::{CopyCredentials, CopyStatement};
pub use pool::ConnectionPool;
pub use session::{
    Connector, PostgresConnector, Row, Session, StatementResult, WarehouseCredentials,
};
pub use table::DestinationTable;

/// Boxed error returned by [`Session`] implementations.
pub type SessionError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during warehouse operations.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Opening a connection failed.
    #[error("Failed to connect to database {db}: {source}")]
    Connect {
        /// Logical database name.
        db: String,
        /// Underlying driver error.
        source: SessionError,
    },

    /// A statement failed. The SQL is kept for diagnostics but left out
    /// of the message, since load statements embed credentials.
    #[error("SQL execution failed: {source}")]
    Execution {
        /// Statement text.
        sql: String,
        /// Underlying driver error.
        source: SessionError,
    },

    /// The column-definition fragment could not be read.
    #[error("Failed to read table schema {}: {source}", path.display())]
    Fragment {
        /// Fragment file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Destination reference is not of the form `schema.table`.
    #[error("Destination tables have the format: schema.table (got {value:?})")]
    InvalidDestination {
        /// Reference as supplied.
        value: String,
    },

    /// A query returned something other than the expected shape.
    #[error("Unexpected result: {message}")]
    UnexpectedResult {
        /// Description of what went wrong.
        message: String,
    },

    /// Credential file problem.
    #[error("Credential error: {0}")]
    Credentials(#[from] redshift_loader_credentials::CredentialError),
}
