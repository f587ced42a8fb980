//! Pluggable column and join resolution for dotted attributes.
//!
//! An attribute `name.sub` is routed to the join filter registered under
//! `name`. Two strategies are provided:
//!
//! - [`EmbeddedJoinFilter`] - the sub-model lives in the entity's own table
//!   as prefixed columns (`address.city` reads `e.address_city`)
//! - [`ForeignJoinFilter`] - the sub-model lives in another table reached
//!   through one JOIN, optionally restricted by a discriminator column (the
//!   attribute name of an EAV value row)
//!
//! Filters are long-lived and shared between queries. Everything that
//! belongs to a single query build, such as which joins were already
//! emitted, lives in the [`QueryContext`].

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::error::{ConfigurationError, StorageResult};
use crate::types::PropertySet;

use super::sql::{ParamBinder, SqlParam, ensure_identifier, qualified};

/// Per-build state shared by the generator and the join filters.
#[derive(Debug)]
pub struct QueryContext {
    entity_alias: String,
    binder: ParamBinder,
    joins: Vec<String>,
    emitted: HashSet<String>,
}

impl QueryContext {
    /// Starts a build for an entity aliased as `entity_alias`.
    pub fn new(entity_alias: impl Into<String>) -> Self {
        Self {
            entity_alias: entity_alias.into(),
            binder: ParamBinder::new(),
            joins: Vec::new(),
            emitted: HashSet::new(),
        }
    }

    /// Alias of the entity table.
    pub fn entity_alias(&self) -> &str {
        &self.entity_alias
    }

    /// Binds a value and returns its placeholder.
    pub fn bind(&mut self, param: SqlParam) -> String {
        self.binder.bind(param)
    }

    /// Returns whether the join for `name` was already emitted.
    pub fn has_join(&self, name: &str) -> bool {
        self.emitted.contains(name)
    }

    /// Records a JOIN clause for `name`. Later calls for the same name are ignored.
    pub fn add_join(&mut self, name: &str, clause: String) {
        if self.emitted.insert(name.to_string()) {
            self.joins.push(clause);
        }
    }

    /// Emitted JOIN clauses, in order.
    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    /// Returns true if at least one JOIN was emitted.
    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Consumes the context, returning the JOIN clauses and bound values.
    pub fn into_parts(self) -> (Vec<String>, Vec<SqlParam>) {
        (self.joins, self.binder.into_params())
    }
}

/// Resolves the attributes routed to one filter name.
pub trait JoinFilter: Send + Sync {
    /// The name that triggers this filter (`name` in `name.sub`).
    fn name(&self) -> &str;

    /// Returns true if this filter reads another table.
    fn is_foreign(&self) -> bool;

    /// Properties reachable as `name.sub`.
    fn properties(&self) -> &PropertySet;

    /// Returns the column expression for `sub`, or for the bare name when
    /// `sub` is `None`, emitting a JOIN into `ctx` if one is needed.
    fn column(&self, sub: Option<&str>, ctx: &mut QueryContext) -> StorageResult<String>;
}

impl fmt::Debug for dyn JoinFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinFilter")
            .field("name", &self.name())
            .field("foreign", &self.is_foreign())
            .finish()
    }
}

fn unknown_sub(name: &str, sub: &str, table: &str) -> crate::error::StorageError {
    ConfigurationError::UnknownAttribute {
        attribute: format!("{}.{}", name, sub),
        table: table.to_string(),
    }
    .into()
}

/// A sub-model flattened into prefixed columns of the entity table.
#[derive(Debug, Clone)]
pub struct EmbeddedJoinFilter {
    name: String,
    prefix: String,
    properties: PropertySet,
}

impl EmbeddedJoinFilter {
    /// Creates a filter reading `prefix_<sub>` for each property of `properties`.
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        properties: PropertySet,
    ) -> StorageResult<Self> {
        let name = name.into();
        let prefix = prefix.into();
        ensure_identifier(&name)?;
        ensure_identifier(&prefix)?;
        Ok(Self {
            name,
            prefix,
            properties,
        })
    }

    /// Builds the filter from the columns the entity embeds under `prefix`.
    pub fn from_entity(entity: &PropertySet, prefix: &str) -> StorageResult<Self> {
        let strip = format!("{}_", prefix);
        let subs = entity
            .iter()
            .filter(|p| p.embedded_in() == Some(prefix))
            .filter_map(|p| p.name().strip_prefix(&strip))
            .map(crate::types::PropertyDef::new)
            .collect();
        Self::new(prefix, prefix, PropertySet::new(subs)?)
    }
}

impl JoinFilter for EmbeddedJoinFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_foreign(&self) -> bool {
        false
    }

    fn properties(&self) -> &PropertySet {
        &self.properties
    }

    fn column(&self, sub: Option<&str>, ctx: &mut QueryContext) -> StorageResult<String> {
        let Some(sub) = sub else {
            return Err(ConfigurationError::UnknownAttribute {
                attribute: self.name.clone(),
                table: format!("embedded {}", self.prefix),
            }
            .into());
        };
        ensure_identifier(sub)?;
        if !self.properties.contains(sub) {
            return Err(unknown_sub(&self.name, sub, &self.prefix));
        }
        qualified(ctx.entity_alias(), &format!("{}_{}", self.prefix, sub))
    }
}

/// A sub-model stored in another table, reached through one JOIN.
///
/// The join condition is `target.<target_id> = entity.<entity_id>`. With a
/// discriminator, `target.<column> = ?` is added to the ON clause so each
/// filter name sees only its own EAV rows.
#[derive(Debug, Clone)]
pub struct ForeignJoinFilter {
    name: String,
    table: String,
    entity_id: String,
    target_id: String,
    properties: PropertySet,
    discriminator: Option<(String, Value)>,
    optional: bool,
}

impl ForeignJoinFilter {
    /// Creates a required (INNER JOIN) filter.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        entity_id: impl Into<String>,
        target_id: impl Into<String>,
        properties: PropertySet,
    ) -> StorageResult<Self> {
        let filter = Self {
            name: name.into(),
            table: table.into(),
            entity_id: entity_id.into(),
            target_id: target_id.into(),
            properties,
            discriminator: None,
            optional: false,
        };
        ensure_identifier(&filter.name)?;
        ensure_identifier(&filter.table)?;
        ensure_identifier(&filter.entity_id)?;
        ensure_identifier(&filter.target_id)?;
        Ok(filter)
    }

    /// Restricts joined rows to those where `column` equals `value`.
    pub fn with_discriminator(
        mut self,
        column: impl Into<String>,
        value: Value,
    ) -> StorageResult<Self> {
        let column = column.into();
        ensure_identifier(&column)?;
        self.discriminator = Some((column, value));
        Ok(self)
    }

    /// Uses a LEFT JOIN so entities without a joined row are kept.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Alias of the joined table.
    pub fn alias(&self) -> String {
        format!("j_{}", self.name)
    }

    fn emit_join(&self, ctx: &mut QueryContext) -> StorageResult<()> {
        if ctx.has_join(&self.name) {
            return Ok(());
        }
        let alias = self.alias();
        let kind = if self.optional { "LEFT JOIN" } else { "INNER JOIN" };
        let mut clause = format!(
            "{} {} AS {} ON {} = {}",
            kind,
            self.table,
            alias,
            qualified(&alias, &self.target_id)?,
            qualified(ctx.entity_alias(), &self.entity_id)?,
        );
        if let Some((column, value)) = &self.discriminator {
            let placeholder = ctx.bind(SqlParam::from_value(value));
            clause.push_str(&format!(
                " AND {} = {}",
                qualified(&alias, column)?,
                placeholder
            ));
        }
        ctx.add_join(&self.name, clause);
        Ok(())
    }
}

impl JoinFilter for ForeignJoinFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_foreign(&self) -> bool {
        true
    }

    fn properties(&self) -> &PropertySet {
        &self.properties
    }

    fn column(&self, sub: Option<&str>, ctx: &mut QueryContext) -> StorageResult<String> {
        let column = match sub {
            None => self.target_id.as_str(),
            Some(sub) => {
                ensure_identifier(sub)?;
                if !self.properties.contains(sub) {
                    return Err(unknown_sub(&self.name, sub, &self.table));
                }
                sub
            }
        };
        self.emit_join(ctx)?;
        qualified(&self.alias(), column)
    }
}
