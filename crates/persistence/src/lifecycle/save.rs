//! The save lifecycle.
//!
//! A save call walks the models through four phases:
//!
//! 1. **Validate**: `before_validate`, then `validate`. This happens before
//!    any transaction is opened, so a validation failure writes nothing.
//! 2. **BeforeSave**: the model's `before_save` override, then each hook
//!    from its property configs. A hook may ask to skip the model or to save
//!    additional models first.
//! 3. **Save**: the persister inserts or updates the model and edit flags
//!    are cleared. If the batch later fails, generated keys and edit flags
//!    are put back so the models can be saved again.
//! 4. **AfterSave**: after-save hooks run. Edits they leave behind are
//!    validated and written once more.
//!
//! Phases 2 to 4 run as one connected unit of work through the
//! [`TransactionFactory`], so any error rolls the whole batch back. If the
//! persister's connection is already inside a transaction, the save joins it
//! and leaves commit to its owner.
//!
//! # Re-entrancy
//!
//! Calling [`SaveLifecycle::save`] from an after-save hook (typically on the
//! model being saved) only validates and writes pending edits. Saves started
//! from any other phase run a complete nested sequence, after which the outer
//! state is restored.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::{ConnectedTask, Model, Persister, TransactionFactory};
use crate::error::StorageResult;

use super::hooks::{HookOutcome, run_after_save, run_before_save};
use super::state::{SaveState, StateGuard};

/// Storage for a model in the current batch.
enum ModelSlot<'m> {
    Borrowed(&'m mut (dyn Model + 'm)),
    /// Added by an `AdditionalModels` hook.
    Owned(Box<dyn Model>),
}

/// A model as it was before the write phase.
struct Snapshot {
    values: Vec<(String, Option<Value>)>,
    edited: Vec<String>,
}

impl Snapshot {
    fn take(model: &dyn Model) -> Self {
        let values = model
            .properties()
            .iter()
            .map(|p| (p.name().to_string(), model.get(p.name()).cloned()))
            .collect();
        Self {
            values,
            edited: model.edited_properties(),
        }
    }

    /// Puts back the key values and flags every property that was edited
    /// before the write or changed since.
    fn restore(self, model: &mut dyn Model) {
        let mut edited = self.edited;
        for (name, before) in self.values {
            if model.get(&name) == before.as_ref() {
                continue;
            }
            if model.properties().is_primary_key(&name) {
                if let Err(e) = model.set(&name, before.unwrap_or(Value::Null)) {
                    tracing::warn!(property = %name, "could not restore key: {}", e);
                }
            } else if !edited.contains(&name) {
                edited.push(name);
            }
        }
        model.restore_edit_flags(&edited);
    }
}

struct Pending<'m> {
    slot: ModelSlot<'m>,
    validated: bool,
    hooks_done: bool,
    skipped: bool,
    snapshot: Option<Snapshot>,
}

impl<'m> Pending<'m> {
    fn new(slot: ModelSlot<'m>, validated: bool) -> Self {
        Self {
            slot,
            validated,
            hooks_done: false,
            skipped: false,
            snapshot: None,
        }
    }

    fn model(&mut self) -> &mut dyn Model {
        match &mut self.slot {
            ModelSlot::Borrowed(model) => &mut **model,
            ModelSlot::Owned(model) => model.as_mut(),
        }
    }
}

/// Sequences validation, hooks and writes for one persister.
pub struct SaveLifecycle {
    persister: Arc<dyn Persister>,
    factory: TransactionFactory,
    state: Cell<SaveState>,
}

impl SaveLifecycle {
    /// Creates a lifecycle using the default transaction factory.
    pub fn new(persister: Arc<dyn Persister>) -> Self {
        Self::with_factory(persister, TransactionFactory::default())
    }

    /// Creates a lifecycle with a custom transaction factory.
    pub fn with_factory(persister: Arc<dyn Persister>, factory: TransactionFactory) -> Self {
        Self {
            persister,
            factory,
            state: Cell::new(SaveState::None),
        }
    }

    /// Current phase.
    pub fn state(&self) -> SaveState {
        self.state.get()
    }

    /// The persister models are written through.
    pub fn persister(&self) -> &Arc<dyn Persister> {
        &self.persister
    }

    /// Saves one model.
    pub fn save(&self, model: &mut dyn Model) -> StorageResult<()> {
        let mut models = [model];
        self.save_all(&mut models)
    }

    /// Saves several models in one transaction.
    pub fn save_all(&self, models: &mut [&mut dyn Model]) -> StorageResult<()> {
        if self.state.get() == SaveState::AfterSave {
            for model in models.iter_mut() {
                self.write_pending_edits(&mut **model)?;
            }
            return Ok(());
        }
        if models.is_empty() {
            return Ok(());
        }

        let _guard = StateGuard::enter(&self.state);

        SaveState::advance(&self.state, SaveState::Validate)?;
        for model in models.iter_mut() {
            model.before_validate()?;
            model.validate()?;
        }

        let mut batch: Vec<Pending<'_>> = models
            .iter_mut()
            .map(|model| Pending::new(ModelSlot::Borrowed(&mut **model), true))
            .collect();

        let connection = self.persister.connection().clone();
        let unit = ConnectedTask::new(connection, || self.run_batch(&mut batch));
        let result = self.factory.execute(vec![Box::new(unit)]);
        if result.is_err() {
            for entry in &mut batch {
                if let Some(snapshot) = entry.snapshot.take() {
                    snapshot.restore(entry.model());
                }
            }
        }
        result
    }

    /// Hook, write and after-save passes over the whole batch.
    fn run_batch(&self, batch: &mut Vec<Pending<'_>>) -> StorageResult<()> {
        loop {
            // Models added by a hook still need validation.
            if self.state.get() != SaveState::Validate {
                SaveState::advance(&self.state, SaveState::Validate)?;
            }
            for entry in batch.iter_mut().filter(|e| !e.validated) {
                let model = entry.model();
                model.before_validate()?;
                model.validate()?;
                entry.validated = true;
            }

            SaveState::advance(&self.state, SaveState::BeforeSave)?;
            let mut additional = None;
            for entry in batch.iter_mut().filter(|e| !e.hooks_done) {
                entry.hooks_done = true;
                match run_before_save(entry.model())? {
                    HookOutcome::Continue => {}
                    HookOutcome::Skip => entry.skipped = true,
                    HookOutcome::AdditionalModels(models) => {
                        additional = Some(models);
                        break;
                    }
                }
            }

            match additional {
                Some(models) => {
                    tracing::debug!(
                        additional = models.len(),
                        "before-save hook added models, restarting batch"
                    );
                    let added = models
                        .into_iter()
                        .map(|model| Pending::new(ModelSlot::Owned(model), false));
                    batch.splice(0..0, added);
                    self.state.set(SaveState::None);
                }
                None => break,
            }
        }

        SaveState::advance(&self.state, SaveState::Save)?;
        for entry in batch.iter_mut().filter(|e| !e.skipped) {
            entry.snapshot = Some(Snapshot::take(entry.model()));
            let model = entry.model();
            self.persister.persist(model)?;
            model.clear_edit_flags();
        }

        SaveState::advance(&self.state, SaveState::AfterSave)?;
        for entry in batch.iter_mut().filter(|e| !e.skipped) {
            let model = entry.model();
            run_after_save(model, self)?;
            if model.is_edited() {
                tracing::debug!("after-save hooks edited the model, writing again");
                self.write_pending_edits(model)?;
            }
        }

        Ok(())
    }

    fn write_pending_edits(&self, model: &mut dyn Model) -> StorageResult<()> {
        if !model.is_edited() {
            return Ok(());
        }
        model.validate()?;
        self.persister.persist(model)?;
        model.clear_edit_flags();
        Ok(())
    }
}

impl fmt::Debug for SaveLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveLifecycle")
            .field("state", &self.state.get())
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}
