//! The SQL executor capability and its SQLite implementation.
//!
//! Binding never touches a database; an [`Executor`] takes the resulting
//! [`PreparedStatement`] and reports a [`RowSet`]. [`SqliteExecutor`] runs
//! statements on a `rusqlite` connection, reusing prepared statements through
//! the connection's statement cache. Every row a query returns is read
//! before [`Executor::execute`] returns, so no cursor outlives the call.

// used for execution against SQLite
use rusqlite::types::ToSql;
use rusqlite::{CachedStatement, Connection};
use tracing::{debug, trace, warn};

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use crate::bind::PreparedStatement;
use crate::error::Result;
use crate::result::{Row, RowSet};
use crate::value::{Params, Value};

pub trait Executor {
    /// Runs `statement` once per bind mapping.
    fn execute(&self, statement: &PreparedStatement) -> Result<RowSet>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, statement: &PreparedStatement) -> Result<RowSet> {
        (**self).execute(statement)
    }
}

// ------------- SqliteExecutor -------------
#[derive(Debug)]
pub struct SqliteExecutor {
    connection: Connection,
    depth: Cell<usize>,
}

impl SqliteExecutor {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            depth: Cell::new(0),
        }
    }
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    /// Runs plain SQL without parameters, e.g. a schema script.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.connection.execute_batch(sql)?;
        Ok(())
    }
    /// Whether a transaction opened through [`SqliteExecutor::transaction`] is active.
    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }

    /// Runs `work` in a transaction, committed when it returns `Ok` and rolled
    /// back otherwise. Nested calls use savepoints, so an inner failure only
    /// undoes the inner work. A commit that fails (e.g. on a deferred foreign
    /// key) is rolled back as well, leaving the connection in autocommit mode.
    pub fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let depth = self.depth.get();
        let savepoint = format!("twinsqla_{}", depth);
        let (commit, rollback) = if depth == 0 {
            self.connection.execute_batch("BEGIN")?;
            ("COMMIT".to_string(), "ROLLBACK".to_string())
        } else {
            self.connection.execute_batch(&format!("SAVEPOINT {}", savepoint))?;
            (
                format!("RELEASE SAVEPOINT {}", savepoint),
                format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", savepoint),
            )
        };
        debug!(depth, "transaction begun");
        self.depth.set(depth + 1);
        let outcome = work(self).and_then(|value| {
            self.connection.execute_batch(&commit)?;
            Ok(value)
        });
        self.depth.set(depth);
        match outcome {
            Ok(value) => {
                debug!(depth, "transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(failed) = self.connection.execute_batch(&rollback) {
                    warn!(depth, error = %failed, "rollback failed");
                }
                debug!(depth, error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }
}

// rusqlite wants the leading colon on named parameters
fn named(params: &Params) -> (Vec<String>, Vec<&Value>) {
    params.iter().map(|(name, value)| (format!(":{}", name), value)).unzip()
}

fn query_rows(statement: &mut CachedStatement, columns: &Arc<[String]>, params: &Params) -> Result<Vec<Row>> {
    let (names, values) = named(params);
    let bound: Vec<(&str, &dyn ToSql)> = names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();
    let mut rows = statement.query(bound.as_slice())?;
    let mut decoded = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get_ref(i).map(Value::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        decoded.push(Row::new(Arc::clone(columns), values));
    }
    Ok(decoded)
}

fn execute_once(statement: &mut CachedStatement, params: &Params) -> Result<usize> {
    let (names, values) = named(params);
    let bound: Vec<(&str, &dyn ToSql)> = names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();
    Ok(statement.execute(bound.as_slice())?)
}

impl Executor for SqliteExecutor {
    fn execute(&self, prepared: &PreparedStatement) -> Result<RowSet> {
        let mut statement = self.connection.prepare_cached(prepared.sql())?;
        let mappings = prepared.bind_params().as_slice();
        trace!(sql = prepared.sql(), mappings = mappings.len(), "executing");
        if statement.column_count() > 0 {
            let columns: Arc<[String]> = statement.column_names().into_iter().map(String::from).collect();
            let mut rows = Vec::new();
            for params in mappings {
                rows.extend(query_rows(&mut statement, &columns, params)?);
            }
            debug!(rows = rows.len(), "query returned");
            Ok(RowSet::with_rows(columns, rows))
        } else {
            let mut affected = 0;
            for params in mappings {
                affected += execute_once(&mut statement, params)?;
            }
            debug!(affected, "statement executed");
            Ok(RowSet::affected(affected))
        }
    }
}
