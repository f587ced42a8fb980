//! Transactions over units of work.
//!
//! A [`Transaction`] owns a set of [`Runnable`]s and knows how to begin,
//! run, commit and roll them back. Two implementations are provided:
//!
//! - [`ConnectionTransaction`] groups units by the connection they write
//!   through and only commits or rolls back connections it opened itself.
//! - [`PlainTransaction`] runs connection-less units; its begin, commit and
//!   rollback are no-ops.
//!
//! # Ownership
//!
//! A connection that is already inside a transaction when
//! [`Transaction::begin`] is called belongs to the caller. Its group runs
//! normally but is never committed or rolled back here, so nesting a save
//! inside an ambient transaction cannot double-commit.

use std::collections::HashMap;
use std::fmt;

use crate::error::{ConfigurationError, StorageResult, TransactionError};

use super::connection::{ConnectionId, SharedConnection};
use super::runnable::Runnable;

/// A begin/run/commit/rollback wrapper around units of work.
pub trait Transaction {
    /// Opens the underlying transactions that are not already open.
    fn begin(&mut self) -> StorageResult<()>;

    /// Runs every unit, in order.
    fn run(&mut self) -> StorageResult<()>;

    /// Commits what this transaction opened.
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back what this transaction opened.
    fn rollback(&mut self) -> StorageResult<()>;

    /// Number of units held.
    fn unit_count(&self) -> usize;
}

/// Units sharing one backing connection.
struct ConnectionGroup<'a> {
    connection: SharedConnection,
    /// Whether this group opened the connection's transaction.
    owned: bool,
    units: Vec<Box<dyn Runnable + 'a>>,
}

/// A transaction over units bound to one or more SQL connections.
///
/// Units are grouped by [`ConnectionId`], preserving the order in which
/// connections were first seen and the insertion order of units within a
/// connection.
pub struct ConnectionTransaction<'a> {
    groups: Vec<ConnectionGroup<'a>>,
}

impl<'a> ConnectionTransaction<'a> {
    /// Groups units by connection.
    ///
    /// Every unit must expose a connection.
    pub fn new(units: Vec<Box<dyn Runnable + 'a>>) -> StorageResult<Self> {
        let mut groups: Vec<ConnectionGroup<'a>> = Vec::new();
        let mut index: HashMap<ConnectionId, usize> = HashMap::new();

        for unit in units {
            let connection = unit
                .connection()
                .cloned()
                .ok_or(ConfigurationError::MissingConnection)?;
            let id = connection.id();
            match index.get(&id) {
                Some(&position) => groups[position].units.push(unit),
                None => {
                    index.insert(id, groups.len());
                    groups.push(ConnectionGroup {
                        connection,
                        owned: false,
                        units: vec![unit],
                    });
                }
            }
        }

        Ok(Self { groups })
    }

    /// Connection ids in execution order.
    pub fn connection_order(&self) -> Vec<ConnectionId> {
        self.groups.iter().map(|g| g.connection.id()).collect()
    }

    /// Returns whether this transaction opened the given connection.
    pub fn owns(&self, id: ConnectionId) -> bool {
        self.groups
            .iter()
            .any(|g| g.owned && g.connection.id() == id)
    }
}

impl Transaction for ConnectionTransaction<'_> {
    fn begin(&mut self) -> StorageResult<()> {
        for group in &mut self.groups {
            if group.connection.in_transaction() {
                tracing::debug!(
                    connection = %group.connection.id(),
                    "connection already in a transaction, reusing it"
                );
                continue;
            }
            group.connection.begin()?;
            group.owned = true;
            tracing::debug!(connection = %group.connection.id(), "transaction started");
        }
        Ok(())
    }

    fn run(&mut self) -> StorageResult<()> {
        for group in &mut self.groups {
            for unit in &mut group.units {
                unit.run()?;
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        let total = self.groups.iter().filter(|g| g.owned).count();
        let mut committed = 0;
        for group in &mut self.groups {
            if !group.owned {
                continue;
            }
            if let Err(e) = group.connection.commit() {
                if committed == 0 {
                    return Err(e);
                }
                tracing::warn!(
                    connection = %group.connection.id(),
                    committed,
                    total,
                    "commit failed after other connections committed: {}",
                    e
                );
                return Err(TransactionError::PartialChainFailure {
                    committed,
                    failed_at: committed + 1,
                    total,
                    source: Box::new(e),
                }
                .into());
            }
            group.owned = false;
            committed += 1;
            tracing::debug!(connection = %group.connection.id(), "transaction committed");
        }
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        let mut first_error = None;
        for group in &mut self.groups {
            if !group.owned {
                continue;
            }
            group.owned = false;
            match group.connection.rollback() {
                Ok(()) => {
                    tracing::debug!(connection = %group.connection.id(), "transaction rolled back")
                }
                Err(e) => {
                    tracing::warn!(
                        connection = %group.connection.id(),
                        "rollback failed: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn unit_count(&self) -> usize {
        self.groups.iter().map(|g| g.units.len()).sum()
    }
}

impl fmt::Debug for ConnectionTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<_> = self
            .groups
            .iter()
            .map(|g| (g.connection.id(), g.units.len(), g.owned))
            .collect();
        f.debug_struct("ConnectionTransaction")
            .field("groups", &groups)
            .finish()
    }
}

/// A transaction over connection-less units.
pub struct PlainTransaction<'a> {
    units: Vec<Box<dyn Runnable + 'a>>,
}

impl<'a> PlainTransaction<'a> {
    /// Wraps the units.
    pub fn new(units: Vec<Box<dyn Runnable + 'a>>) -> Self {
        Self { units }
    }
}

impl Transaction for PlainTransaction<'_> {
    fn begin(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn run(&mut self) -> StorageResult<()> {
        for unit in &mut self.units {
            unit.run()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl fmt::Debug for PlainTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTransaction")
            .field("units", &self.units.len())
            .finish()
    }
}

/// Builds a [`ConnectionTransaction`] for the factory registry.
pub fn connection_transaction<'a>(
    units: Vec<Box<dyn Runnable + 'a>>,
) -> StorageResult<Box<dyn Transaction + 'a>> {
    Ok(Box::new(ConnectionTransaction::new(units)?))
}

/// Builds a [`PlainTransaction`] for the factory registry.
pub fn plain_transaction<'a>(
    units: Vec<Box<dyn Runnable + 'a>>,
) -> StorageResult<Box<dyn Transaction + 'a>> {
    Ok(Box::new(PlainTransaction::new(units)))
}
