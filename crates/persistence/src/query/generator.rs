//! Compiles a [`SearchQueryBuilder`] into parameterized SQL.
//!
//! # Generated shape
//!
//! ```text
//! SELECT <select list> FROM <table> AS e
//!   [<joins>]
//!   [WHERE (<and block>) [OR (<or block>)]]
//!   GROUP BY <primary keys>, <selected or entity-group columns>
//!   [ORDER BY <columns>]
//!   [LIMIT <offset>,<size>]
//! ```
//!
//! Values never appear in the SQL text; they are bound through numbered
//! placeholders. Table, column and alias names pass the identifier guard
//! before they are assembled.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::Row;
use crate::error::{ConfigurationError, StorageResult};
use crate::types::{PropertySet, SearchConfig};

use super::condition::{Condition, Conjunction, Operator, SearchQueryBuilder};
use super::folding::fold_rows;
use super::join_filter::{JoinFilter, QueryContext};
use super::sql::{SqlParam, ensure_identifier, qualified};

const ENTITY_ALIAS: &str = "e";

/// Compiled SQL, its bound values and the columns identifying an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    sql: String,
    values: Vec<SqlParam>,
    unique_id: Vec<String>,
    entity_groups: Vec<String>,
}

impl QueryOutput {
    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound values, in placeholder order.
    pub fn values(&self) -> &[SqlParam] {
        &self.values
    }

    /// Primary key columns of the result rows.
    pub fn unique_id(&self) -> &[String] {
        &self.unique_id
    }

    /// Entity-group columns of the result rows.
    pub fn entity_groups(&self) -> &[String] {
        &self.entity_groups
    }

    /// Folds result rows into entities keyed by primary key and entity groups.
    pub fn fold(&self, rows: Vec<Row>) -> Vec<Row> {
        fold_rows(rows, &self.unique_id, &self.entity_groups)
    }
}

impl fmt::Display for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A resolved attribute.
struct Column {
    expression: String,
    label: String,
    /// True for plain columns of the entity table.
    local: bool,
}

impl Column {
    fn select_item(&self) -> String {
        if self.label.contains('.') {
            format!("{} AS \"{}\"", self.expression, self.label)
        } else {
            format!("{} AS {}", self.expression, self.label)
        }
    }
}

/// Query generator for one entity table.
pub struct QueryGenerator {
    table: String,
    properties: Arc<PropertySet>,
    filters: BTreeMap<String, Arc<dyn JoinFilter>>,
    config: SearchConfig,
}

impl QueryGenerator {
    /// Creates a generator for `table`, whose columns are `properties`.
    pub fn new(table: impl Into<String>, properties: Arc<PropertySet>) -> StorageResult<Self> {
        let table = table.into();
        ensure_identifier(&table)?;
        if properties.primary_keys().is_empty() {
            return Err(ConfigurationError::MissingPrimaryKey { table }.into());
        }
        Ok(Self {
            table,
            properties,
            filters: BTreeMap::new(),
            config: SearchConfig::default(),
        })
    }

    /// Replaces the search limits.
    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a join filter under its name.
    pub fn with_join_filter(mut self, filter: Arc<dyn JoinFilter>) -> StorageResult<Self> {
        let name = ensure_identifier(filter.name())?.to_string();
        if self.filters.contains_key(&name) || self.properties.contains(&name) {
            return Err(ConfigurationError::DuplicateJoinFilter { name }.into());
        }
        self.filters.insert(name, filter);
        Ok(self)
    }

    /// The entity table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The entity's property set.
    pub fn properties(&self) -> &Arc<PropertySet> {
        &self.properties
    }

    /// The search limits.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Compiles a search.
    pub fn create_query(&self, builder: &SearchQueryBuilder) -> StorageResult<QueryOutput> {
        let page = builder.paging().resolve(&self.config)?;
        let mut ctx = QueryContext::new(ENTITY_ALIAS);
        let primary_keys = self.primary_key_columns()?;

        let groups = builder
            .entity_group_attributes()
            .iter()
            .map(|attribute| self.resolve(attribute, &mut ctx))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut select = Vec::new();
        let mut group_by: Vec<String> = primary_keys.iter().map(|c| c.expression.clone()).collect();

        match builder.selected_attributes() {
            None => {
                select.push(format!("{}.*", ENTITY_ALIAS));
                for group in &groups {
                    if !group.local {
                        select.push(group.select_item());
                    }
                    push_unique(&mut group_by, &group.expression);
                }
            }
            Some(attributes) => {
                let mut columns: Vec<Column> = Vec::new();
                for key in primary_keys.iter() {
                    if !attributes.iter().any(|a| *a == key.label) {
                        columns.push(self.resolve(&key.label, &mut ctx)?);
                    }
                }
                for attribute in attributes {
                    columns.push(self.resolve(attribute, &mut ctx)?);
                }
                for group in groups {
                    columns.push(group);
                }

                let mut labels: Vec<&str> = Vec::new();
                for column in &columns {
                    if labels.contains(&column.label.as_str()) {
                        continue;
                    }
                    labels.push(&column.label);
                    select.push(column.select_item());
                    push_unique(&mut group_by, &column.expression);
                }
            }
        }

        let where_clause = self.where_clause(builder, &mut ctx)?;

        let mut order = Vec::new();
        for sort in builder.ordering() {
            let column = self.resolve(&sort.attribute, &mut ctx)?;
            order.push(format!("{} {}", column.expression, sort.direction.as_sql()));
        }

        let (joins, values) = ctx.into_parts();

        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            select.join(", "),
            self.table,
            ENTITY_ALIAS
        );
        for join in &joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if let Some(where_clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_by.join(", "));
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {},{}", page.offset(), page.size));
        }

        tracing::debug!(sql = %sql, values = values.len(), "generated search query");

        Ok(QueryOutput {
            sql,
            values,
            unique_id: primary_keys.into_iter().map(|c| c.label).collect(),
            entity_groups: builder.entity_group_attributes().to_vec(),
        })
    }

    /// Compiles the count of entities matching a search.
    ///
    /// Paging, sorting and selection are ignored. When the conditions join
    /// other tables the count is over distinct primary keys.
    pub fn create_count_query(&self, builder: &SearchQueryBuilder) -> StorageResult<QueryOutput> {
        let mut ctx = QueryContext::new(ENTITY_ALIAS);
        let primary_keys = self.primary_key_columns()?;
        let where_clause = self.where_clause(builder, &mut ctx)?;
        let fans_out = ctx.has_joins();
        let (joins, values) = ctx.into_parts();

        let mut from = format!("{} AS {}", self.table, ENTITY_ALIAS);
        for join in &joins {
            from.push(' ');
            from.push_str(join);
        }
        if let Some(where_clause) = where_clause {
            from.push_str(" WHERE ");
            from.push_str(&where_clause);
        }

        let keys: Vec<&str> = primary_keys.iter().map(|c| c.expression.as_str()).collect();
        let sql = match (fans_out, keys.as_slice()) {
            (false, _) => format!("SELECT count(*) AS total FROM {}", from),
            (true, [key]) => format!("SELECT count(DISTINCT {}) AS total FROM {}", key, from),
            (true, keys) => format!(
                "SELECT count(*) AS total FROM (SELECT DISTINCT {} FROM {})",
                keys.join(", "),
                from
            ),
        };

        tracing::debug!(sql = %sql, values = values.len(), "generated count query");

        Ok(QueryOutput {
            sql,
            values,
            unique_id: primary_keys.into_iter().map(|c| c.label).collect(),
            entity_groups: Vec::new(),
        })
    }

    fn primary_key_columns(&self) -> StorageResult<Vec<Column>> {
        self.properties
            .primary_keys()
            .into_iter()
            .map(|key| {
                Ok(Column {
                    expression: qualified(ENTITY_ALIAS, key)?,
                    label: key.to_string(),
                    local: true,
                })
            })
            .collect()
    }

    /// Maps an attribute to a column, checking it against the schema.
    fn resolve(&self, attribute: &str, ctx: &mut QueryContext) -> StorageResult<Column> {
        let parts: Vec<&str> = attribute.split('.').collect();
        match parts.as_slice() {
            [name] => {
                if self.properties.contains(name) {
                    return Ok(Column {
                        expression: qualified(ctx.entity_alias(), name)?,
                        label: name.to_string(),
                        local: true,
                    });
                }
                match self.filters.get(*name) {
                    Some(filter) => Ok(Column {
                        expression: filter.column(None, ctx)?,
                        label: name.to_string(),
                        local: false,
                    }),
                    None => Err(ConfigurationError::UnknownAttribute {
                        attribute: attribute.to_string(),
                        table: self.table.clone(),
                    }
                    .into()),
                }
            }
            [name, sub] => {
                let filter = self.filters.get(*name).ok_or_else(|| {
                    ConfigurationError::UnknownJoinFilter {
                        name: name.to_string(),
                        attribute: attribute.to_string(),
                    }
                })?;
                Ok(Column {
                    expression: filter.column(Some(*sub), ctx)?,
                    label: attribute.to_string(),
                    local: false,
                })
            }
            _ => Err(ConfigurationError::NestingTooDeep {
                attribute: attribute.to_string(),
            }
            .into()),
        }
    }

    fn where_clause(
        &self,
        builder: &SearchQueryBuilder,
        ctx: &mut QueryContext,
    ) -> StorageResult<Option<String>> {
        let mut and_parts = Vec::new();
        for condition in builder.conditions_for(Conjunction::And) {
            and_parts.push(self.predicate(condition, ctx)?);
        }
        let mut or_parts = Vec::new();
        for condition in builder.conditions_for(Conjunction::Or) {
            or_parts.push(self.predicate(condition, ctx)?);
        }

        let and_block = (!and_parts.is_empty()).then(|| format!("({})", and_parts.join(" AND ")));
        let or_block = (!or_parts.is_empty()).then(|| format!("({})", or_parts.join(" OR ")));
        Ok(match (and_block, or_block) {
            (Some(and), Some(or)) => Some(format!("{} OR {}", and, or)),
            (Some(block), None) | (None, Some(block)) => Some(block),
            (None, None) => None,
        })
    }

    fn predicate(&self, condition: &Condition, ctx: &mut QueryContext) -> StorageResult<String> {
        let column = self.resolve(&condition.attribute, ctx)?;
        let expression = column.expression;
        let invalid = |message: &str| ConfigurationError::InvalidOperand {
            attribute: condition.attribute.clone(),
            operator: condition.operator.to_string(),
            message: message.to_string(),
        };

        match (condition.operator, &condition.value) {
            (Operator::Eq, Value::Null) => Ok(format!("{} IS NULL", expression)),
            (Operator::Ne, Value::Null) => Ok(format!("{} IS NOT NULL", expression)),
            (Operator::In, Value::Array(values)) => {
                if values.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| ctx.bind(SqlParam::from_value(v)))
                    .collect();
                Ok(format!("{} IN ({})", expression, placeholders.join(", ")))
            }
            (Operator::In, _) => Err(invalid("expected a list of values").into()),
            (_, Value::Null) => Err(invalid("null only compares with = and !=").into()),
            (_, Value::Array(_) | Value::Object(_)) => {
                Err(invalid("expected a scalar value").into())
            }
            (operator, value) => {
                let placeholder = ctx.bind(SqlParam::from_value(value));
                Ok(format!("{} {} {}", expression, operator.as_sql(), placeholder))
            }
        }
    }
}

impl fmt::Debug for QueryGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryGenerator")
            .field("table", &self.table)
            .field("properties", &self.properties.to_string())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}
