//! Units of work.
//!
//! A [`Runnable`] is the smallest executable step of a save or batch
//! operation. Units that write through a connection expose it, which is what
//! the [`TransactionFactory`](super::factory::TransactionFactory) uses to
//! classify them.

use std::fmt;

use crate::error::StorageResult;

use super::connection::SharedConnection;

/// Capability tag used to pick a transaction implementation for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// The unit writes through a SQL connection.
    Connected,
    /// The unit has no connection (pure in-process work).
    Plain,
}

impl Capability {
    /// Every capability, most specific first.
    pub const ALL: [Capability; 2] = [Capability::Connected, Capability::Plain];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Connected => write!(f, "connected"),
            Capability::Plain => write!(f, "plain"),
        }
    }
}

/// An executable step.
pub trait Runnable {
    /// Executes the step.
    fn run(&mut self) -> StorageResult<()>;

    /// The connection this step writes through, if any.
    fn connection(&self) -> Option<&SharedConnection> {
        None
    }

    /// The capability used for transaction classification.
    fn capability(&self) -> Capability {
        if self.connection().is_some() {
            Capability::Connected
        } else {
            Capability::Plain
        }
    }
}

/// A unit of work backed by a closure, with no connection.
pub struct Task<F> {
    body: F,
}

impl<F> Task<F>
where
    F: FnMut() -> StorageResult<()>,
{
    /// Wraps a closure.
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F> Runnable for Task<F>
where
    F: FnMut() -> StorageResult<()>,
{
    fn run(&mut self) -> StorageResult<()> {
        (self.body)()
    }
}

impl<F> fmt::Debug for Task<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// A unit of work backed by a closure that writes through `connection`.
pub struct ConnectedTask<F> {
    connection: SharedConnection,
    body: F,
}

impl<F> ConnectedTask<F>
where
    F: FnMut() -> StorageResult<()>,
{
    /// Binds a closure to a connection.
    pub fn new(connection: SharedConnection, body: F) -> Self {
        Self { connection, body }
    }
}

impl<F> Runnable for ConnectedTask<F>
where
    F: FnMut() -> StorageResult<()>,
{
    fn run(&mut self) -> StorageResult<()> {
        (self.body)()
    }

    fn connection(&self) -> Option<&SharedConnection> {
        Some(&self.connection)
    }
}

impl<F> fmt::Debug for ConnectedTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedTask")
            .field("connection", &self.connection.id())
            .finish_non_exhaustive()
    }
}
