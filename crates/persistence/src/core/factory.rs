//! Classification of units of work into transactions.
//!
//! The [`TransactionFactory`] is a registry from [`Capability`] to a
//! transaction constructor. Units are grouped by capability; every group
//! becomes one transaction, and transactions are ordered by the position of
//! their first unit.
//!
//! # Example
//!
//! ```
//! use quarry_persistence::core::{Capability, Task, TransactionFactory};
//! use quarry_persistence::core::{connection_transaction, plain_transaction};
//!
//! let factory = TransactionFactory::builder()
//!     .register(Capability::Connected, connection_transaction)
//!     .register(Capability::Plain, plain_transaction)
//!     .build()
//!     .unwrap();
//!
//! let mut ran = false;
//! factory
//!     .execute(vec![Box::new(Task::new(|| {
//!         ran = true;
//!         Ok(())
//!     }))])
//!     .unwrap();
//! assert!(ran);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConfigurationError, StorageResult};

use super::manager::{ChainedTransactionManager, ExecuteTryTransactionManager};
use super::runnable::{Capability, Runnable};
use super::transaction::{Transaction, connection_transaction, plain_transaction};

/// Builds a transaction over a group of units of one capability.
pub type TransactionConstructor =
    for<'a> fn(Vec<Box<dyn Runnable + 'a>>) -> StorageResult<Box<dyn Transaction + 'a>>;

/// Registry of transaction constructors keyed by capability.
///
/// Only [`TransactionFactoryBuilder::build`] creates one, and it refuses to
/// do so unless every capability has a constructor.
#[derive(Clone)]
pub struct TransactionFactory {
    constructors: BTreeMap<Capability, TransactionConstructor>,
}

impl TransactionFactory {
    /// Starts an empty registry.
    pub fn builder() -> TransactionFactoryBuilder {
        TransactionFactoryBuilder::default()
    }

    /// Splits units into transactions, one per capability.
    pub fn create_transactions<'a>(
        &self,
        units: Vec<Box<dyn Runnable + 'a>>,
    ) -> StorageResult<Vec<Box<dyn Transaction + 'a>>> {
        let mut groups: Vec<(Capability, Vec<Box<dyn Runnable + 'a>>)> = Vec::new();
        for unit in units {
            let capability = unit.capability();
            match groups.iter_mut().find(|(c, _)| *c == capability) {
                Some((_, group)) => group.push(unit),
                None => groups.push((capability, vec![unit])),
            }
        }

        let mut transactions = Vec::with_capacity(groups.len());
        for (capability, group) in groups {
            let constructor = self.constructors.get(&capability).ok_or_else(|| {
                ConfigurationError::UnregisteredCapability {
                    capability: capability.to_string(),
                }
            })?;
            tracing::debug!(%capability, units = group.len(), "creating transaction");
            transactions.push(constructor(group)?);
        }
        Ok(transactions)
    }

    /// Runs the units through a [`ChainedTransactionManager`].
    pub fn execute<'a>(&self, units: Vec<Box<dyn Runnable + 'a>>) -> StorageResult<()> {
        let transactions = self.create_transactions(units)?;
        ChainedTransactionManager::new(transactions).execute()
    }

    /// Runs the units and calls `check` before anything is committed.
    pub fn execute_and_try<'a, F>(
        &self,
        units: Vec<Box<dyn Runnable + 'a>>,
        check: F,
    ) -> StorageResult<()>
    where
        F: FnOnce() -> StorageResult<()>,
    {
        let transactions = self.create_transactions(units)?;
        ExecuteTryTransactionManager::new(transactions, check).execute()
    }
}

impl Default for TransactionFactory {
    /// Connection transactions for connected units, plain ones otherwise.
    fn default() -> Self {
        let mut constructors: BTreeMap<Capability, TransactionConstructor> = BTreeMap::new();
        constructors.insert(Capability::Connected, connection_transaction);
        constructors.insert(Capability::Plain, plain_transaction);
        Self { constructors }
    }
}

impl fmt::Debug for TransactionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionFactory")
            .field("capabilities", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`TransactionFactory`].
#[derive(Default)]
pub struct TransactionFactoryBuilder {
    constructors: BTreeMap<Capability, TransactionConstructor>,
}

impl TransactionFactoryBuilder {
    /// Registers the constructor for a capability, replacing any earlier one.
    pub fn register(mut self, capability: Capability, constructor: TransactionConstructor) -> Self {
        self.constructors.insert(capability, constructor);
        self
    }

    /// Builds the factory once every capability is covered.
    pub fn build(self) -> StorageResult<TransactionFactory> {
        if let Some(missing) = Capability::ALL
            .iter()
            .find(|c| !self.constructors.contains_key(c))
        {
            return Err(ConfigurationError::UnregisteredCapability {
                capability: missing.to_string(),
            }
            .into());
        }
        Ok(TransactionFactory {
            constructors: self.constructors,
        })
    }
}

impl fmt::Debug for TransactionFactoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionFactoryBuilder")
            .field("capabilities", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
