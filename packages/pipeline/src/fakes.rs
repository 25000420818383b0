//! In-memory S3 and Redshift stand-ins for pipeline tests.
//!
//! The fake warehouse understands just the statements the pipeline
//! issues: catalog lookups, the drop/create batch, the CSV `COPY` and the
//! row count. `COPY` really parses the stored object so header skipping
//! and blank-to-null conversion can be asserted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redshift_loader_s3::{BucketProbe, ObjectStore, PollConfig, S3Error, StorageGateway};
use redshift_loader_warehouse::{
    ConnectionPool, Connector, CopyCredentials, Row, Session, StatementResult, WarehouseError,
};

use crate::{Pipeline, PipelineOptions};

type FakeResult = Result<StatementResult, redshift_loader_warehouse::SessionError>;

/// A warehouse table: column names and text rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Everything the fakes know about, plus call counters.
#[derive(Debug, Default)]
pub struct State {
    pub buckets: BTreeSet<String>,
    pub objects: BTreeMap<(String, String), Vec<u8>>,
    pub schemas: BTreeSet<String>,
    pub tables: BTreeMap<String, Table>,
    pub statements: Vec<String>,
    pub connects: usize,
    pub puts: usize,
    pub fail_put: bool,
    pub ignore_create: bool,
    pub fail_count: bool,
}

/// Shared handle to the fake world.
#[derive(Debug, Clone, Default)]
pub struct World(Arc<Mutex<State>>);

impl World {
    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    pub fn statements_containing(&self, needle: &str) -> Vec<String> {
        self.with(|w| {
            w.statements
                .iter()
                .filter(|s| s.contains(needle))
                .cloned()
                .collect()
        })
    }

    pub fn pipeline(&self, options: PipelineOptions) -> Pipeline {
        let storage = StorageGateway::new(Arc::new(FakeStore(self.clone()))).with_poll(PollConfig {
            attempts: 2,
            interval: Duration::from_millis(1),
        });
        let pool = Arc::new(ConnectionPool::new(Box::new(FakeConnector(self.clone()))));
        let credentials = CopyCredentials {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
        };
        Pipeline::new(storage, pool, credentials, options)
    }
}

struct FakeStore(World);

#[async_trait]
impl ObjectStore for FakeStore {
    async fn probe_bucket(&self, bucket: &str) -> BucketProbe {
        if self.0.with(|w| w.buckets.contains(bucket)) {
            BucketProbe::Found
        } else {
            BucketProbe::NotFound
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), S3Error> {
        let fail = self.0.with(|w| {
            w.puts += 1;
            w.fail_put
        });
        if fail {
            return Err(S3Error::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: "request timed out".into(),
            });
        }

        let data = std::fs::read(path)?;
        self.0.with(|w| {
            w.objects.insert((bucket.to_string(), key.to_string()), data);
        });
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, S3Error> {
        Ok(self
            .0
            .with(|w| w.objects.contains_key(&(bucket.to_string(), key.to_string()))))
    }
}

struct FakeConnector(World);

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _db: &str) -> Result<Box<dyn Session>, WarehouseError> {
        self.0.with(|w| w.connects += 1);
        Ok(Box::new(FakeSession(self.0.clone())))
    }
}

struct FakeSession(World);

#[async_trait]
impl Session for FakeSession {
    async fn run(&self, sql: &str) -> FakeResult {
        self.0.with(|w| {
            w.statements.push(sql.to_string());

            if sql.contains("pg_namespace") {
                let schema = between(sql, "nspname = '", "'")?;
                Ok(boolean(w.schemas.contains(schema)))
            } else if sql.contains("pg_tables") {
                let schema = between(sql, "schemaname = '", "'")?;
                let table = between(sql, "tablename = '", "'")?;
                Ok(boolean(w.tables.contains_key(&format!("{schema}.{table}"))))
            } else if sql.starts_with("DROP TABLE IF EXISTS ") {
                create_table(w, sql)
            } else if sql.contains("COPY ") {
                copy_csv(w, sql)
            } else if sql.starts_with("SELECT COUNT(*) FROM ") {
                if w.fail_count {
                    return Err("permission denied for relation".into());
                }
                let name = between(sql, "FROM ", ";")?;
                let table = w.tables.get(name).ok_or("relation does not exist")?;
                Ok(StatementResult::Rows(vec![Row::new(vec![Some(
                    table.rows.len().to_string(),
                )])]))
            } else {
                Err(format!("unsupported statement: {sql}").into())
            }
        })
    }
}

fn create_table(w: &mut State, sql: &str) -> FakeResult {
    let name = between(sql, "DROP TABLE IF EXISTS ", ";")?.to_string();
    let prefix = format!("CREATE TABLE {name} (");
    let start = sql.find(&prefix).ok_or("missing CREATE TABLE")? + prefix.len();
    let end = sql.rfind("); COMMIT;").ok_or("missing COMMIT")?;
    let fragment = &sql[start..end];

    let schema = name.split('.').next().unwrap_or_default();
    if !w.schemas.contains(schema) {
        return Err(format!("schema \"{schema}\" does not exist").into());
    }

    w.tables.remove(&name);
    if !w.ignore_create {
        let columns = fragment
            .split(',')
            .filter_map(|col| col.split_whitespace().next())
            .map(str::to_string)
            .collect();
        w.tables.insert(
            name,
            Table {
                columns,
                rows: Vec::new(),
            },
        );
    }

    Ok(StatementResult::NoResultSet)
}

fn copy_csv(w: &mut State, sql: &str) -> FakeResult {
    let name = between(sql, "COPY ", "\n")?;
    let uri = between(sql, "FROM '", "'")?;
    let (bucket, key) = uri
        .strip_prefix("s3://")
        .and_then(|rest| rest.split_once('/'))
        .ok_or("bad COPY source")?;

    let data = w
        .objects
        .get(&(bucket.to_string(), key.to_string()))
        .ok_or("The specified S3 prefix does not exist")?
        .clone();

    let mut rows = Vec::new();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_slice());
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| (!field.trim().is_empty()).then(|| field.to_string()))
                .collect::<Vec<_>>(),
        );
    }

    let table = w.tables.get_mut(name).ok_or("relation does not exist")?;
    if rows.iter().any(|row| row.len() != table.columns.len()) {
        return Err("Delimiter not found".into());
    }
    table.rows.extend(rows);

    Ok(StatementResult::NoResultSet)
}

fn boolean(value: bool) -> StatementResult {
    let text = if value { "t" } else { "f" };
    StatementResult::Rows(vec![Row::new(vec![Some(text.to_string())])])
}

fn between<'a>(haystack: &'a str, start: &str, end: &str) -> Result<&'a str, String> {
    let from = haystack
        .find(start)
        .map(|idx| idx + start.len())
        .ok_or_else(|| format!("missing {start:?}"))?;
    let len = haystack[from..]
        .find(end)
        .ok_or_else(|| format!("missing {end:?}"))?;
    Ok(&haystack[from..from + len])
}
