//! A generic, schema-driven model.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::{Model, Row};
use crate::error::{StorageResult, ValidationError};
use crate::lifecycle::SaveHook;

use super::property::PropertySet;

/// A model whose properties are described by a [`PropertySet`] at runtime.
///
/// Values are JSON. Setting a value that differs from the current one flags
/// the property as edited.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use quarry_persistence::core::Model;
/// use quarry_persistence::types::{PropertyDef, PropertySet, Record};
/// use serde_json::json;
///
/// let properties = Arc::new(PropertySet::new(vec![
///     PropertyDef::primary("id"),
///     PropertyDef::new("sku").required(),
/// ]).unwrap());
///
/// let mut record = Record::new(properties);
/// assert!(record.validate().is_err());
///
/// record.set("sku", json!("A-1")).unwrap();
/// assert!(record.validate().is_ok());
/// assert_eq!(record.edited_properties(), vec!["sku"]);
/// ```
#[derive(Clone)]
pub struct Record {
    properties: Arc<PropertySet>,
    values: Map<String, Value>,
    edited: HashSet<String>,
    hooks: Vec<Arc<dyn SaveHook>>,
}

impl Record {
    /// Creates an empty record.
    pub fn new(properties: Arc<PropertySet>) -> Self {
        Self {
            properties,
            values: Map::new(),
            edited: HashSet::new(),
            hooks: Vec::new(),
        }
    }

    /// Creates a record from a loaded row, with no edits.
    ///
    /// Columns outside the property set (joined columns, for instance) are
    /// kept and readable through [`Model::get`] but are never written.
    pub fn from_row(properties: Arc<PropertySet>, row: Row) -> Self {
        Self {
            properties,
            values: row,
            edited: HashSet::new(),
            hooks: Vec::new(),
        }
    }

    /// Sets a property, builder style.
    pub fn with(mut self, name: &str, value: Value) -> StorageResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Attaches a save hook.
    pub fn with_hook(mut self, hook: Arc<dyn SaveHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// All values, loaded columns included.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Consumes the record, returning its values.
    pub fn into_values(self) -> Row {
        self.values
    }
}

impl Model for Record {
    fn properties(&self) -> &PropertySet {
        &self.properties
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn set(&mut self, name: &str, value: Value) -> StorageResult<()> {
        if !self.properties.contains(name) {
            return Err(ValidationError::UnknownProperty {
                property: name.to_string(),
            }
            .into());
        }
        if self.values.get(name) != Some(&value) {
            self.edited.insert(name.to_string());
            self.values.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn is_edited(&self) -> bool {
        !self.edited.is_empty()
    }

    fn edited_properties(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|p| self.edited.contains(p.name()))
            .map(|p| p.name().to_string())
            .collect()
    }

    fn clear_edit_flags(&mut self) {
        self.edited.clear();
    }

    fn restore_edit_flags(&mut self, names: &[String]) {
        self.edited = names
            .iter()
            .filter(|name| self.properties.contains(name))
            .cloned()
            .collect();
    }

    fn validate(&self) -> StorageResult<()> {
        for property in self.properties.iter().filter(|p| p.is_required()) {
            let missing = self.values.get(property.name()).is_none_or(Value::is_null);
            if missing {
                return Err(ValidationError::MissingRequiredProperty {
                    property: property.name().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn property_configs(&self) -> Vec<Arc<dyn SaveHook>> {
        self.hooks.clone()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("values", &self.values)
            .field("edited", &self.edited_properties())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
