//! Recording connection used by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::sql::SqlParam;

use super::connection::{Connection, ConnectionId, Row};

/// Journal shared between connections so tests can assert global ordering.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A connection that writes every call into a journal as `name:call`.
pub(crate) struct RecordingConnection {
    name: String,
    id: ConnectionId,
    journal: Journal,
    in_transaction: AtomicBool,
    fail_commit: AtomicBool,
    fail_execute: AtomicBool,
    next_insert_id: AtomicI64,
    rows: Mutex<Vec<Row>>,
    statements: Mutex<Vec<(String, Vec<SqlParam>)>>,
}

impl RecordingConnection {
    pub(crate) fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            id: ConnectionId::new(),
            journal,
            in_transaction: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_execute: AtomicBool::new(false),
            next_insert_id: AtomicI64::new(1),
            rows: Mutex::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn shared(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, journal()))
    }

    pub(crate) fn shared_with(name: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self::new(name, journal.clone()))
    }

    /// Simulates a transaction opened by the caller, outside of the journal.
    pub(crate) fn open_caller_transaction(&self) {
        self.in_transaction.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_commits(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_executes(&self) {
        self.fail_execute.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock() = rows;
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.statements.lock().clone()
    }

    fn record(&self, call: impl AsRef<str>) {
        self.journal
            .lock()
            .push(format!("{}:{}", self.name, call.as_ref()));
    }

    fn failure(&self, what: &str) -> StorageError {
        StorageError::Backend(BackendError::QueryError {
            message: format!("{} failed on {}", what, self.name),
        })
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn begin(&self) -> StorageResult<()> {
        self.record("begin");
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            self.record("commit-failed");
            return Err(self.failure("commit"));
        }
        self.record("commit");
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        self.record("rollback");
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> StorageResult<usize> {
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(self.failure("execute"));
        }
        self.record(format!("execute {}", sql));
        self.statements.lock().push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    fn for_each_row(
        &self,
        sql: &str,
        params: &[SqlParam],
        f: &mut dyn FnMut(Row) -> StorageResult<()>,
    ) -> StorageResult<()> {
        self.record(format!("select {}", sql));
        self.statements.lock().push((sql.to_string(), params.to_vec()));
        let rows = self.rows.lock().clone();
        for row in rows {
            f(row)?;
        }
        Ok(())
    }

    fn last_insert_id(&self) -> StorageResult<i64> {
        Ok(self.next_insert_id.fetch_add(1, Ordering::SeqCst))
    }

    fn acquire_lock(&self, name: &str) -> StorageResult<()> {
        self.record(format!("lock {}", name));
        Ok(())
    }

    fn release_lock(&self, name: &str) -> StorageResult<()> {
        self.record(format!("unlock {}", name));
        Ok(())
    }

    fn lock_tables(&self, tables: &[&str]) -> StorageResult<()> {
        if self.in_transaction() {
            return Err(crate::error::ConfigurationError::LockWhileTransactional {
                target: tables.join(", "),
            }
            .into());
        }
        self.record(format!("lock-tables {}", tables.join(",")));
        Ok(())
    }

    fn unlock_tables(&self) -> StorageResult<()> {
        self.record("unlock-tables");
        Ok(())
    }
}
