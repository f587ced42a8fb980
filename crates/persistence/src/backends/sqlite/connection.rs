//! [`Connection`] implementation over a pooled SQLite connection.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::ReentrantMutex;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params_from_iter;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use serde_json::{Number, Value};

use crate::core::{Connection, ConnectionId, Row};
use crate::error::{ConfigurationError, StorageError, StorageResult, TransactionError};
use crate::query::SqlParam;

use super::locks::LockRegistry;

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlParam::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlParam::Float(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlParam::Null => ToSqlOutput::Owned(SqliteValue::Null),
        })
    }
}

/// Converts a column value to JSON. Blobs become base64 strings.
fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

/// A pooled SQLite connection shared by the units of work that use it.
///
/// The underlying connection sits behind a reentrant lock, so a row callback
/// may issue further statements on the same connection.
pub struct SqliteConnection {
    id: ConnectionId,
    conn: ReentrantMutex<PooledConnection<SqliteConnectionManager>>,
    locks: Arc<LockRegistry>,
}

impl SqliteConnection {
    pub(crate) fn new(
        conn: PooledConnection<SqliteConnectionManager>,
        locks: Arc<LockRegistry>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            conn: ReentrantMutex::new(conn),
            locks,
        }
    }

    /// Runs one or more statements without parameters (schema setup, pragmas).
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    fn run_control(&self, sql: &str) -> StorageResult<()> {
        self.conn.lock().execute_batch(sql).map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("{} failed: {}", sql, e),
            })
        })
    }
}

impl Connection for SqliteConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn begin(&self) -> StorageResult<()> {
        self.run_control("BEGIN IMMEDIATE")
    }

    fn commit(&self) -> StorageResult<()> {
        self.run_control("COMMIT")
    }

    fn rollback(&self) -> StorageResult<()> {
        self.run_control("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        !self.conn.lock().is_autocommit()
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter()))?)
    }

    fn for_each_row(
        &self,
        sql: &str,
        params: &[SqlParam],
        f: &mut dyn FnMut(Row) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            let mut values = Row::new();
            for (index, column) in columns.iter().enumerate() {
                values.insert(column.clone(), to_json(row.get_ref(index)?));
            }
            f(values)?;
        }
        Ok(())
    }

    fn last_insert_id(&self) -> StorageResult<i64> {
        Ok(self.conn.lock().last_insert_rowid())
    }

    fn acquire_lock(&self, name: &str) -> StorageResult<()> {
        self.locks.acquire(name, self.id);
        Ok(())
    }

    fn release_lock(&self, name: &str) -> StorageResult<()> {
        self.locks.release(name, self.id)
    }

    fn lock_tables(&self, tables: &[&str]) -> StorageResult<()> {
        // SQLite locks the whole database; an exclusive transaction covers every table.
        if self.in_transaction() {
            return Err(ConfigurationError::LockWhileTransactional {
                target: tables.join(", "),
            }
            .into());
        }
        self.run_control("BEGIN EXCLUSIVE")
    }

    fn unlock_tables(&self) -> StorageResult<()> {
        if self.in_transaction() {
            self.run_control("COMMIT")?;
        }
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            tracing::warn!(
                connection = %self.id,
                "connection dropped inside a transaction, rolling back"
            );
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(connection = %self.id, "rollback on drop failed: {}", e);
            }
        }
        drop(conn);
        self.locks.release_all(self.id);
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
