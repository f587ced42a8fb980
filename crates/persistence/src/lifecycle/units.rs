//! Units of work that save models through a [`SaveLifecycle`].
//!
//! Both units expose the persister's connection, so they join the
//! connection transaction of whatever batch they are scheduled in.

use std::cell::{RefCell, RefMut};
use std::fmt;

use crate::core::{Model, Runnable, SharedConnection};
use crate::error::StorageResult;

use super::save::SaveLifecycle;

/// Saves models that are known when the unit is built.
pub struct SaveUnit<'a> {
    lifecycle: &'a SaveLifecycle,
    models: Vec<&'a RefCell<dyn Model>>,
}

impl<'a> SaveUnit<'a> {
    /// Creates a unit saving `models` in one `save_all` call.
    pub fn new(lifecycle: &'a SaveLifecycle, models: Vec<&'a RefCell<dyn Model>>) -> Self {
        Self { lifecycle, models }
    }
}

impl Runnable for SaveUnit<'_> {
    fn run(&mut self) -> StorageResult<()> {
        let mut guards: Vec<RefMut<'_, dyn Model>> =
            self.models.iter().map(|cell| cell.borrow_mut()).collect();
        let mut models: Vec<&mut dyn Model> = Vec::with_capacity(guards.len());
        for guard in guards.iter_mut() {
            models.push(&mut **guard);
        }
        self.lifecycle.save_all(&mut models)
    }

    fn connection(&self) -> Option<&SharedConnection> {
        Some(self.lifecycle.persister().connection())
    }
}

impl fmt::Debug for SaveUnit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveUnit")
            .field("models", &self.models.len())
            .finish_non_exhaustive()
    }
}

/// Saves models produced when the unit runs.
///
/// The producer runs inside the transaction, after every earlier unit, so it
/// can read ids those units generated.
pub struct LazySaveUnit<'a, F> {
    lifecycle: &'a SaveLifecycle,
    produce: F,
}

impl<'a, F> LazySaveUnit<'a, F>
where
    F: FnMut() -> StorageResult<Vec<Box<dyn Model>>>,
{
    /// Creates a unit that saves whatever `produce` returns.
    pub fn new(lifecycle: &'a SaveLifecycle, produce: F) -> Self {
        Self { lifecycle, produce }
    }
}

impl<F> Runnable for LazySaveUnit<'_, F>
where
    F: FnMut() -> StorageResult<Vec<Box<dyn Model>>>,
{
    fn run(&mut self) -> StorageResult<()> {
        let mut produced = (self.produce)()?;
        tracing::debug!(models = produced.len(), "lazy save unit resolved");
        let mut models: Vec<&mut dyn Model> = Vec::with_capacity(produced.len());
        for model in produced.iter_mut() {
            models.push(model.as_mut());
        }
        self.lifecycle.save_all(&mut models)
    }

    fn connection(&self) -> Option<&SharedConnection> {
        Some(self.lifecycle.persister().connection())
    }
}

impl<F> fmt::Debug for LazySaveUnit<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySaveUnit").finish_non_exhaustive()
    }
}
