//! SQLite backend implementation.
//!
//! Supports both in-memory databases (great for testing) and file-based
//! databases. Connections come from an r2d2 pool and implement
//! [`Connection`](crate::core::Connection), so repositories, transactions and
//! the save lifecycle run on top of them unchanged.
//!
//! SQLite has no per-table locks or named locks. `lock_tables` opens an
//! exclusive transaction on the whole database, and advisory locks are kept
//! in a registry shared by every connection of one backend.
//!
//! # Example
//!
//! ```no_run
//! use quarry_persistence::backends::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.execute_batch("CREATE TABLE product (id INTEGER PRIMARY KEY, sku TEXT)")?;
//!
//! let connection = backend.connection()?;
//! let rows = connection.select("SELECT count(*) AS total FROM product", &[])?;
//! assert_eq!(rows[0]["total"], 0);
//! # Ok(())
//! # }
//! ```

mod backend;
mod connection;
mod locks;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use connection::SqliteConnection;
