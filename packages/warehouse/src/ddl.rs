//! Table creation from an operator-written column fragment.
//!
//! The fragment is the text that goes between the parentheses of
//! `CREATE TABLE`, for example:
//!
//! ```text
//! id INT,
//! name VARCHAR(50),
//! amount FLOAT
//! ```
//!
//! It is used verbatim. Syntax errors only surface when the generated
//! batch runs.

use std::path::Path;

use crate::{DestinationTable, WarehouseError};

/// Reads `source_dir/source_file` and builds the
/// `DROP TABLE IF EXISTS ...; CREATE TABLE ... (...); COMMIT;` batch for
/// `dest_table`.
///
/// # Errors
///
/// Returns [`WarehouseError::Fragment`] if the file cannot be read.
pub fn build_create_statement(
    source_dir: &Path,
    source_file: &str,
    dest_table: &DestinationTable,
) -> Result<String, WarehouseError> {
    let path = source_dir.join(source_file);
    let fragment = std::fs::read_to_string(&path)
        .map_err(|source| WarehouseError::Fragment { path, source })?;

    Ok(create_statement(fragment.trim(), dest_table))
}

/// Wraps an already-loaded column fragment into the create batch.
#[must_use]
pub fn create_statement(fragment: &str, dest_table: &DestinationTable) -> String {
    format!("DROP TABLE IF EXISTS {dest_table}; CREATE TABLE {dest_table} ({fragment}); COMMIT;")
}
