//! Catalog lookups for schemas and tables.

use std::sync::Arc;

use crate::{ConnectionPool, DestinationTable, Row, WarehouseError};

/// Read-only catalog queries over a shared [`ConnectionPool`].
#[derive(Clone)]
pub struct Catalog {
    pool: Arc<ConnectionPool>,
}

impl Catalog {
    /// Creates a catalog reader over `pool`.
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Returns whether schema `schema_name` exists in `db`.
    ///
    /// # Errors
    ///
    /// Propagates [`WarehouseError`] from execution, or
    /// [`WarehouseError::UnexpectedResult`] if the answer is not a boolean.
    pub async fn schema_exists(
        &self,
        schema_name: &str,
        db: &str,
    ) -> Result<bool, WarehouseError> {
        let sql = format!(
            "SELECT EXISTS (SELECT nspname FROM pg_namespace WHERE nspname = {});",
            quote_literal(schema_name)
        );
        let rows = self.pool.execute(&sql, db, false).await?;
        first_bool(&rows)
    }

    /// Returns whether `schema_name.table_name` exists in `db`.
    ///
    /// # Errors
    ///
    /// Propagates [`WarehouseError`] from execution, or
    /// [`WarehouseError::UnexpectedResult`] if the answer is not a boolean.
    pub async fn table_exists(
        &self,
        schema_name: &str,
        table_name: &str,
        db: &str,
    ) -> Result<bool, WarehouseError> {
        let sql = format!(
            "SELECT EXISTS (SELECT tablename FROM pg_tables \
             WHERE schemaname = {} AND tablename = {});",
            quote_literal(schema_name),
            quote_literal(table_name)
        );
        let rows = self.pool.execute(&sql, db, false).await?;
        first_bool(&rows)
    }

    /// Counts the rows in `table`.
    ///
    /// # Errors
    ///
    /// Propagates [`WarehouseError`] from execution, or
    /// [`WarehouseError::UnexpectedResult`] if the count cannot be parsed.
    pub async fn count_rows(
        &self,
        table: &DestinationTable,
        db: &str,
    ) -> Result<u64, WarehouseError> {
        let sql = format!("SELECT COUNT(*) FROM {table};");
        let rows = self.pool.execute(&sql, db, false).await?;
        let value = first_value(&rows)?;
        value.parse().map_err(|_| WarehouseError::UnexpectedResult {
            message: format!("row count is not a number: {value:?}"),
        })
    }
}

/// Renders `value` as a SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn first_value(rows: &[Row]) -> Result<&str, WarehouseError> {
    rows.first()
        .and_then(|row| row.get(0))
        .ok_or_else(|| WarehouseError::UnexpectedResult {
            message: "query returned no value".to_string(),
        })
}

fn first_bool(rows: &[Row]) -> Result<bool, WarehouseError> {
    match first_value(rows)? {
        "t" | "true" | "TRUE" | "1" => Ok(true),
        "f" | "false" | "FALSE" | "0" => Ok(false),
        other => Err(WarehouseError::UnexpectedResult {
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
