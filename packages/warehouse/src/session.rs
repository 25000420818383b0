//! Connection seam between the pool and the database driver.
//!
//! [`PostgresConnector`] speaks the Postgres wire protocol, which Redshift
//! implements. Statements go over the simple-query protocol so a single
//! call can carry a `BEGIN; ...; COMMIT;` batch.

use async_trait::async_trait;
use redshift_loader_credentials::{CredentialError, CredentialSet};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::{SessionError, WarehouseError};

/// One result row, as the text values the server sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(Vec<Option<String>>);

impl Row {
    /// Creates a row from its column values.
    #[must_use]
    pub const fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    /// Text value of column `idx`; `None` for SQL `NULL` or out of range.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(Option::as_deref)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shape of a statement batch's result, taken from its last statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementResult {
    /// The statement produced a result set (possibly with zero rows).
    Rows(Vec<Row>),
    /// The statement produced no result set (DDL, `COPY`, `COMMIT`, ...).
    NoResultSet,
}

/// An open warehouse connection.
#[async_trait]
pub trait Session: Send + Sync {
    /// Runs a statement batch and returns the shape of its last result.
    ///
    /// # Errors
    ///
    /// Returns the driver error if any statement fails.
    async fn run(&self, sql: &str) -> Result<StatementResult, SessionError>;
}

/// Opens [`Session`]s for logical database names.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new connection to `db`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Connect`] if the connection fails.
    async fn connect(&self, db: &str) -> Result<Box<dyn Session>, WarehouseError>;
}

/// Redshift connection settings from the `redshift_creds` file.
#[derive(Clone)]
pub struct WarehouseCredentials {
    /// Cluster endpoint host.
    pub host: String,
    /// Cluster port.
    pub port: u16,
    /// Default database name.
    pub database: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl WarehouseCredentials {
    /// Reads `HOST`, `PORT`, `DATABASE`, `USERNAME` and `PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingKey`] for absent keys and
    /// [`CredentialError::Invalid`] if `PORT` is not a port number.
    pub fn from_credentials(creds: &CredentialSet) -> Result<Self, CredentialError> {
        let port = creds.require("PORT")?;
        let port = port.parse::<u16>().map_err(|e| CredentialError::Invalid {
            key: "PORT".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            host: creds.require("HOST")?.to_string(),
            port,
            database: creds.require("DATABASE")?.to_string(),
            username: creds.require("USERNAME")?.to_string(),
            password: creds.require("PASSWORD")?.to_string(),
        })
    }
}

impl std::fmt::Debug for WarehouseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Connects to Redshift with `tokio-postgres`.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    credentials: WarehouseCredentials,
}

impl PostgresConnector {
    /// Creates a connector. The logical database name passed to
    /// [`Connector::connect`] is used as the `dbname`.
    #[must_use]
    pub const fn new(credentials: WarehouseCredentials) -> Self {
        Self { credentials }
    }

    /// How a connection target appears in log output. Only the logical
    /// database name is shown, never values from the credential file.
    fn target(db: &str) -> String {
        format!("database {db}")
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, db: &str) -> Result<Box<dyn Session>, WarehouseError> {
        let creds = &self.credentials;
        log::info!("Connecting to {}", Self::target(db));

        let (client, connection) = tokio_postgres::Config::new()
            .host(&creds.host)
            .port(creds.port)
            .dbname(db)
            .user(&creds.username)
            .password(&creds.password)
            .connect(NoTls)
            .await
            .map_err(|e| WarehouseError::Connect {
                db: db.to_string(),
                source: Box::new(e),
            })?;

        let name = db.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("Connection to {name} closed with error: {e}");
            }
        });

        Ok(Box::new(PostgresSession { client }))
    }
}

/// A live `tokio-postgres` connection. Dropping it closes the connection.
struct PostgresSession {
    client: Client,
}

#[async_trait]
impl Session for PostgresSession {
    async fn run(&self, sql: &str) -> Result<StatementResult, SessionError> {
        match self.client.simple_query(sql).await {
            Ok(messages) => Ok(classify(messages)),
            Err(e) => {
                // Leave no aborted transaction behind for the next batch.
                if let Err(rollback) = self.client.batch_execute("ROLLBACK").await {
                    log::debug!("ROLLBACK after failed statement failed: {rollback}");
                }
                Err(Box::new(e))
            }
        }
    }
}

/// Reduces simple-query messages to the shape of the last statement.
fn classify(messages: Vec<SimpleQueryMessage>) -> StatementResult {
    let mut current: Option<Vec<Row>> = None;
    let mut last = StatementResult::NoResultSet;

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(_) => {
                if current.is_none() {
                    current = Some(Vec::new());
                }
            }
            SimpleQueryMessage::Row(row) => {
                let values = (0..row.len())
                    .map(|idx| row.get(idx).map(str::to_string))
                    .collect();
                current.get_or_insert_with(Vec::new).push(Row::new(values));
            }
            SimpleQueryMessage::CommandComplete(_) => {
                last = current
                    .take()
                    .map_or(StatementResult::NoResultSet, StatementResult::Rows);
            }
            _ => {}
        }
    }

    last
}
