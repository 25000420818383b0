//! Two-part `schema.table` destination references.

use std::str::FromStr;

use crate::WarehouseError;

/// A destination table, always exactly `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationTable {
    schema: String,
    table: String,
}

impl DestinationTable {
    /// Parses a `schema.table` reference.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::InvalidDestination`] unless the value
    /// contains exactly one `.` with a non-empty name on each side.
    pub fn parse(value: &str) -> Result<Self, WarehouseError> {
        let invalid = || WarehouseError::InvalidDestination {
            value: value.to_string(),
        };

        let mut parts = value.split('.');
        let (Some(schema), Some(table), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        if schema.is_empty() || table.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name within the schema.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl FromStr for DestinationTable {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for DestinationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
