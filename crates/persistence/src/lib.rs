//! Quarry Persistence Layer
//!
//! This crate saves models and searches tables on top of a pluggable
//! connection. It sequences every save through a validate / before-save /
//! save / after-save lifecycle, coordinates units of work that span several
//! connections, and compiles searches over entity, embedded and foreign
//! attributes into parameterized SQL.
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! quarry-persistence = { version = "0.1", features = ["sqlite"] }
//! ```
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! # Architecture
//!
//! - [`core`] - Connections, units of work, transactions and the transaction factory
//! - [`lifecycle`] - The save lifecycle, save hooks and save units
//! - [`query`] - Search builder, join filters, SQL generation and row folding
//! - [`repository`] - Table-backed persister and search runner
//! - [`types`] - Property sets, the generic [`Record`] model and paging
//! - [`error`] - Error types for all operations
//! - [`backends`] - Backend implementations
//!
//! # Quick Start
//!
//! ```
//! # #[cfg(feature = "sqlite")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use quarry_persistence::backends::sqlite::SqliteBackend;
//! use quarry_persistence::core::Model;
//! use quarry_persistence::query::SearchQueryBuilder;
//! use quarry_persistence::types::{PropertyDef, PropertySet};
//! use quarry_persistence::{SaveLifecycle, TableRepository};
//! use serde_json::json;
//!
//! let backend = SqliteBackend::in_memory()?;
//! backend.execute_batch(
//!     "CREATE TABLE product (id INTEGER PRIMARY KEY, sku TEXT NOT NULL, status TEXT)",
//! )?;
//!
//! let properties = Arc::new(PropertySet::new(vec![
//!     PropertyDef::primary("id"),
//!     PropertyDef::new("sku").required(),
//!     PropertyDef::new("status"),
//! ])?);
//! let repository = Arc::new(TableRepository::new(
//!     backend.connection()?,
//!     "product",
//!     properties,
//! )?);
//! let lifecycle = SaveLifecycle::new(repository.clone());
//!
//! let mut product = repository
//!     .new_record()
//!     .with("sku", json!("A-1"))?
//!     .with("status", json!("active"))?;
//! lifecycle.save(&mut product)?;
//! assert_eq!(product.get("id"), Some(&json!(1)));
//!
//! let active = repository.search(&SearchQueryBuilder::new().and("status", json!("active")))?;
//! assert_eq!(active.len(), 1);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sqlite"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod lifecycle;
pub mod query;
pub mod repository;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use lifecycle::{HookOutcome, SaveHook, SaveLifecycle};
pub use repository::TableRepository;
pub use types::{PropertyDef, PropertySet, Record};

// Re-export core traits
pub use crate::core::{Connection, Model, Persister, Runnable, Transaction, TransactionFactory};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
