//! The contracts between the engine and the objects it stores.

use std::sync::Arc;

use serde_json::Value;

use crate::error::StorageResult;
use crate::lifecycle::{HookOutcome, SaveHook, SaveLifecycle};
use crate::types::PropertySet;

use super::connection::SharedConnection;

/// A persistable object with per-property edit tracking.
///
/// The override points `before_validate`, `before_save` and `after_save`
/// default to no-ops. Additional hooks come from [`Model::property_configs`]
/// and run after the model's own override, in order.
pub trait Model {
    /// Schema of the persisted properties.
    fn properties(&self) -> &PropertySet;

    /// Current value of a property.
    fn get(&self, name: &str) -> Option<&Value>;

    /// Sets a property and flags it as edited when the value changes.
    fn set(&mut self, name: &str, value: Value) -> StorageResult<()>;

    /// Returns whether any property has been edited since the last save.
    fn is_edited(&self) -> bool;

    /// Names of edited properties, in declaration order.
    fn edited_properties(&self) -> Vec<String>;

    /// Forgets all edits.
    fn clear_edit_flags(&mut self);

    /// Replaces the edit flags with the given properties.
    ///
    /// Used to undo [`Model::clear_edit_flags`] when the write is rolled back.
    fn restore_edit_flags(&mut self, names: &[String]);

    /// Checks the model before it is written.
    fn validate(&self) -> StorageResult<()>;

    /// Primary key column names and their current values.
    fn primary_key_values(&self) -> Vec<(String, Value)> {
        self.properties()
            .primary_keys()
            .into_iter()
            .map(|key| (key.to_string(), self.get(key).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// Returns true once every primary key column holds a value.
    fn has_primary_key_value(&self) -> bool {
        let keys = self.primary_key_values();
        !keys.is_empty() && keys.iter().all(|(_, value)| !value.is_null())
    }

    /// Hooks attached through property configuration.
    fn property_configs(&self) -> Vec<Arc<dyn SaveHook>> {
        Vec::new()
    }

    /// Runs before validation.
    fn before_validate(&mut self) -> StorageResult<()> {
        Ok(())
    }

    /// Runs inside the transaction, before the model is written.
    fn before_save(&mut self) -> StorageResult<HookOutcome> {
        Ok(HookOutcome::Continue)
    }

    /// Runs after the model is written, still inside the transaction.
    ///
    /// Calling [`SaveLifecycle::save`] on this model from here writes pending
    /// edits without re-running any hook.
    fn after_save(&mut self, _lifecycle: &SaveLifecycle) -> StorageResult<()> {
        Ok(())
    }
}

/// Writes models through a connection.
pub trait Persister {
    /// The connection every write goes through.
    fn connection(&self) -> &SharedConnection;

    /// Inserts the model when it has no primary key value, otherwise updates
    /// its edited columns.
    fn persist(&self, model: &mut dyn Model) -> StorageResult<()>;
}
