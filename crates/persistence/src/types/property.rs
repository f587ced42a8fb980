//! Property sets: the column schema a model and a query generator share.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, StorageResult};
use crate::query::sql::ensure_identifier;

/// Definition of a single persisted property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    name: String,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedded_in: Option<String>,
}

impl PropertyDef {
    /// Creates an optional, non-key property.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            required: false,
            embedded_in: None,
        }
    }

    /// Creates a primary key property.
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name)
        }
    }

    /// Marks the property as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns the property (and column) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether this property is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Returns whether a value must be present before saving.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the embedding prefix for flattened sub-model columns.
    pub fn embedded_in(&self) -> Option<&str> {
        self.embedded_in.as_deref()
    }
}

/// The set of properties a model persists, in declaration order.
///
/// Sub-models stored in the same table are flattened into prefixed columns
/// (`address` + `city` becomes `address_city`) via [`PropertySet::with_embedded`].
///
/// Serializes as the list of its properties, which is how a schema is
/// exported. Deserializing runs the same checks as [`PropertySet::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PropertyDef>", into = "Vec<PropertyDef>")]
pub struct PropertySet {
    properties: Vec<PropertyDef>,
}

impl PropertySet {
    /// Creates a property set, checking every name against the identifier guard.
    pub fn new(properties: Vec<PropertyDef>) -> StorageResult<Self> {
        let mut set = Self::default();
        for property in properties {
            set.push(property)?;
        }
        Ok(set)
    }

    /// Adds the columns of an embedded sub-model under `prefix`.
    pub fn with_embedded(
        mut self,
        prefix: impl Into<String>,
        properties: Vec<PropertyDef>,
    ) -> StorageResult<Self> {
        let prefix = prefix.into();
        ensure_identifier(&prefix)?;
        for property in properties {
            self.push(PropertyDef {
                name: format!("{}_{}", prefix, property.name),
                primary_key: false,
                required: property.required,
                embedded_in: Some(prefix.clone()),
            })?;
        }
        Ok(self)
    }

    fn push(&mut self, property: PropertyDef) -> StorageResult<()> {
        ensure_identifier(&property.name)?;
        if self.contains(&property.name) {
            return Err(ConfigurationError::DuplicateProperty {
                name: property.name,
            }
            .into());
        }
        self.properties.push(property);
        Ok(())
    }

    /// Returns true if `name` is a column of this set, embedded columns included.
    pub fn contains(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns true if `name` is a flattened column of an embedded sub-model.
    pub fn is_embedded_column(&self, name: &str) -> bool {
        self.property(name).is_some_and(|p| p.embedded_in.is_some())
    }

    /// Returns true if `name` belongs to the primary key.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.property(name).is_some_and(|p| p.primary_key)
    }

    /// Primary key column names, in declaration order.
    pub fn primary_keys(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.primary_key)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Iterates over all properties.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter()
    }

    /// Exports the column list used for query generation and inserts.
    pub fn columns(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if the set declares no property.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl TryFrom<Vec<PropertyDef>> for PropertySet {
    type Error = crate::error::StorageError;

    fn try_from(properties: Vec<PropertyDef>) -> StorageResult<Self> {
        Self::new(properties)
    }
}

impl From<PropertySet> for Vec<PropertyDef> {
    fn from(set: PropertySet) -> Self {
        set.properties
    }
}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.columns().join(", "))
    }
}
