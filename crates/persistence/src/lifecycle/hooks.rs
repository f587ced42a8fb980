//! Save hooks attached to models through property configuration.

use std::fmt;

use crate::core::Model;
use crate::error::StorageResult;

use super::save::SaveLifecycle;

/// What a before-save hook wants the lifecycle to do next.
pub enum HookOutcome {
    /// Keep going.
    Continue,
    /// Do not write this model; it was persisted some other way.
    Skip,
    /// Abort the current pass and save these models first, together with
    /// the current batch.
    AdditionalModels(Vec<Box<dyn Model>>),
}

impl HookOutcome {
    /// Returns true for [`HookOutcome::Continue`].
    pub fn is_continue(&self) -> bool {
        matches!(self, HookOutcome::Continue)
    }
}

impl fmt::Debug for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookOutcome::Continue => write!(f, "Continue"),
            HookOutcome::Skip => write!(f, "Skip"),
            HookOutcome::AdditionalModels(models) => f
                .debug_tuple("AdditionalModels")
                .field(&models.len())
                .finish(),
        }
    }
}

/// A hook contributed by a property configuration.
///
/// Hooks of a model run after the model's own override of the same phase,
/// in the order [`Model::property_configs`] returns them.
pub trait SaveHook {
    /// Runs inside the transaction before the model is written.
    fn before_save(&self, _model: &mut dyn Model) -> StorageResult<HookOutcome> {
        Ok(HookOutcome::Continue)
    }

    /// Runs after the model is written.
    fn after_save(&self, _model: &mut dyn Model, _lifecycle: &SaveLifecycle) -> StorageResult<()> {
        Ok(())
    }
}

/// Runs the model override, then every attached hook, stopping at the first
/// outcome that is not `Continue`.
pub(crate) fn run_before_save(model: &mut dyn Model) -> StorageResult<HookOutcome> {
    let outcome = model.before_save()?;
    if !outcome.is_continue() {
        return Ok(outcome);
    }
    for hook in model.property_configs() {
        let outcome = hook.before_save(model)?;
        if !outcome.is_continue() {
            return Ok(outcome);
        }
    }
    Ok(HookOutcome::Continue)
}

pub(crate) fn run_after_save(
    model: &mut dyn Model,
    lifecycle: &SaveLifecycle,
) -> StorageResult<()> {
    model.after_save(lifecycle)?;
    for hook in model.property_configs() {
        hook.after_save(model, lifecycle)?;
    }
    Ok(())
}
