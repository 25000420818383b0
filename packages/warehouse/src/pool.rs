//! One cached warehouse connection per logical database name.
//!
//! A connection moves `absent -> open` on the first [`ConnectionPool::execute`]
//! for its database and `open -> absent` on [`ConnectionPool::close`].
//! There is no reconnection on failure; a closed database simply gets a
//! fresh connection on its next `execute`.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tokio::sync::Mutex;

use crate::{Connector, Row, Session, StatementResult, WarehouseError};

/// Width of the banner around SQL error diagnostics.
const BANNER_WIDTH: usize = 70;

/// Connection cache keyed by logical database name.
pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    sessions: Mutex<BTreeMap<String, Box<dyn Session>>>,
}

impl ConnectionPool {
    /// Creates an empty pool that opens connections with `connector`.
    #[must_use]
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Runs `sql` on the connection for `db`, opening it if needed, and
    /// returns all result rows. Statements without a result set return an
    /// empty list.
    ///
    /// On failure a diagnostic with the error and the statement is logged
    /// unless `quiet` is set; the error is returned either way.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Connect`] if no connection can be opened
    /// and [`WarehouseError::Execution`] if the statement fails.
    pub async fn execute(
        &self,
        sql: &str,
        db: &str,
        quiet: bool,
    ) -> Result<Vec<Row>, WarehouseError> {
        let mut sessions = self.sessions.lock().await;

        let session = match sessions.entry(db.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.connector.connect(db).await?),
        };

        match session.run(sql).await {
            Ok(StatementResult::Rows(rows)) => Ok(rows),
            Ok(StatementResult::NoResultSet) => {
                log::trace!("Statement on {db} produced no result set");
                Ok(Vec::new())
            }
            Err(source) => {
                if !quiet {
                    let banner = "-".repeat(BANNER_WIDTH);
                    log::error!(
                        "\n{banner}\nGot an error executing SQL statement!\nerror: {source}\nsql: {sql}\n{banner}"
                    );
                }
                Err(WarehouseError::Execution {
                    sql: sql.to_string(),
                    source,
                })
            }
        }
    }

    /// Closes and evicts the connection for `db`. Does nothing if none is
    /// open.
    pub async fn close(&self, db: &str) {
        if self.sessions.lock().await.remove(db).is_some() {
            log::debug!("Closed connection to {db}");
        }
    }

    /// Closes every open connection.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            log::debug!("Closed {count} connection(s)");
        }
    }

    /// Whether a connection for `db` is currently cached.
    pub async fn is_open(&self, db: &str) -> bool {
        self.sessions.lock().await.contains_key(db)
    }
}
