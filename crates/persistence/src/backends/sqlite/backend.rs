//! SQLite backend: pool construction and connection hand-out.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SharedConnection;
use crate::error::{BackendError, StorageError, StorageResult};

use super::connection::SqliteConnection;
use super::locks::LockRegistry;

const BACKEND_NAME: &str = "sqlite";

/// SQLite backend handing out [`SqliteConnection`]s from a pool.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    locks: Arc<LockRegistry>,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    ///
    /// Every pooled connection sees the same database, which lives as long as
    /// the pool keeps a connection open.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let is_memory = path.as_ref().to_string_lossy() == ":memory:";

        let manager = if is_memory {
            SqliteConnectionManager::file(format!(
                "file:quarry-{}?mode=memory&cache=shared",
                Uuid::new_v4().simple()
            ))
        } else {
            SqliteConnectionManager::file(path.as_ref())
        };

        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
            }
            if wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            }
            Ok(())
        });

        let mut builder = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections.max(u32::from(is_memory))))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            // The shared in-memory database disappears with its last connection.
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = builder.build(manager).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })?;

        tracing::info!(
            memory = is_memory,
            max_connections = config.max_connections,
            "SQLite backend ready"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
            locks: Arc::new(LockRegistry::default()),
        })
    }

    /// Checks out a connection for use by repositories and transactions.
    pub fn connection(&self) -> StorageResult<SharedConnection> {
        Ok(self.sqlite_connection()?)
    }

    /// Checks out a connection, keeping its concrete type.
    pub fn sqlite_connection(&self) -> StorageResult<Arc<SqliteConnection>> {
        let conn = self.get_connection()?;
        Ok(Arc::new(SqliteConnection::new(conn, self.locks.clone())))
    }

    /// Runs schema statements on a fresh connection.
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Get a connection from the pool.
    ///
    /// Fails with `PoolExhausted` when no connection frees up within the
    /// configured connection timeout.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }
}
