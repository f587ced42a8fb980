//! Connection abstraction consumed by transactions, repositories and locks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::query::sql::SqlParam;

/// A result row: column name to value.
pub type Row = Map<String, Value>;

/// A connection shared between units of work.
pub type SharedConnection = Arc<dyn Connection>;

/// Identity of a backing connection, used to group units of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A storage connection.
///
/// Implementations use interior mutability so a single connection can be
/// shared by every unit of work that writes through it. Timeouts and
/// cancellation are left to the driver.
pub trait Connection: Send + Sync {
    /// Returns the identity used to group units of work.
    fn id(&self) -> ConnectionId;

    /// Starts a transaction.
    fn begin(&self) -> StorageResult<()>;

    /// Commits the open transaction.
    fn commit(&self) -> StorageResult<()>;

    /// Rolls back the open transaction.
    fn rollback(&self) -> StorageResult<()>;

    /// Returns whether a transaction is currently open on this connection.
    fn in_transaction(&self) -> bool;

    /// Executes a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlParam]) -> StorageResult<usize>;

    /// Runs a query and hands each row to `f` as it is read.
    fn for_each_row(
        &self,
        sql: &str,
        params: &[SqlParam],
        f: &mut dyn FnMut(Row) -> StorageResult<()>,
    ) -> StorageResult<()>;

    /// Runs a query and collects all rows.
    fn select(&self, sql: &str, params: &[SqlParam]) -> StorageResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.for_each_row(sql, params, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Returns the id generated by the last insert on this connection.
    fn last_insert_id(&self) -> StorageResult<i64>;

    /// Acquires a named advisory lock, blocking until it is available.
    fn acquire_lock(&self, name: &str) -> StorageResult<()>;

    /// Releases a named advisory lock held by this connection.
    fn release_lock(&self, name: &str) -> StorageResult<()>;

    /// Takes an exclusive lock on the given tables.
    ///
    /// Exclusive locks force an implicit commit, so implementations must fail
    /// with `ConfigurationError::LockWhileTransactional` when a transaction
    /// is already open.
    fn lock_tables(&self, tables: &[&str]) -> StorageResult<()>;

    /// Releases the exclusive lock taken by [`Connection::lock_tables`].
    fn unlock_tables(&self) -> StorageResult<()>;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
