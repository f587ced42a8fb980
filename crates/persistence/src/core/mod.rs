//! Core abstractions for units of work and their transactions.
//!
//! - [`Connection`] - Storage connection consumed by everything else
//! - [`Runnable`] - The smallest executable step
//! - [`Transaction`] - Begin/run/commit/rollback over units of work
//! - [`ChainedTransactionManager`], [`ExecuteTryTransactionManager`] -
//!   Ordered commit of several transactions
//! - [`TransactionFactory`] - Classifies units into transactions by capability
//! - [`Model`], [`Persister`] - What gets saved and what writes it
//!
//! # Layering
//!
//! ```text
//! TransactionFactory
//!     └── ChainedTransactionManager / ExecuteTryTransactionManager
//!             └── Transaction (ConnectionTransaction, PlainTransaction)
//!                     └── Runnable (Task, ConnectedTask, SaveUnit, ...)
//!                             └── Connection
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry_persistence::core::{ConnectedTask, Connection, TransactionFactory};
//!
//! let conn = backend.connection()?;
//! let writer = conn.clone();
//! TransactionFactory::default().execute(vec![Box::new(ConnectedTask::new(conn, move || {
//!     writer.execute("UPDATE product SET status = 'active'", &[])?;
//!     Ok(())
//! }))])?;
//! ```

pub mod connection;
pub mod factory;
pub mod manager;
pub mod model;
pub mod runnable;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, ConnectionId, Row, SharedConnection};
pub use factory::{TransactionConstructor, TransactionFactory, TransactionFactoryBuilder};
pub use manager::{ChainedTransactionManager, ExecuteTryTransactionManager};
pub use model::{Model, Persister};
pub use runnable::{Capability, ConnectedTask, Runnable, Task};
pub use transaction::{
    ConnectionTransaction, PlainTransaction, Transaction, connection_transaction,
    plain_transaction,
};
