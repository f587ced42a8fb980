//! Table-backed repository: writes models and runs searches for one table.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::{Model, Persister, Row, SharedConnection};
use crate::error::{ConfigurationError, ResourceError, StorageResult};
use crate::query::sql::{SqlFragment, SqlParam, ensure_identifier};
use crate::query::{JoinFilter, QueryGenerator, QueryOutput, SearchQueryBuilder};
use crate::types::{PropertySet, Record, SearchConfig};

/// Reads and writes rows of one table through one connection.
///
/// `TableRepository` is the [`Persister`] used by the
/// [`SaveLifecycle`](crate::lifecycle::SaveLifecycle): it inserts models
/// without a primary key value and updates the edited columns of the others.
/// Searches are compiled by its [`QueryGenerator`].
pub struct TableRepository {
    connection: SharedConnection,
    generator: QueryGenerator,
}

impl TableRepository {
    /// Creates a repository for `table`.
    pub fn new(
        connection: SharedConnection,
        table: impl Into<String>,
        properties: Arc<PropertySet>,
    ) -> StorageResult<Self> {
        Ok(Self {
            connection,
            generator: QueryGenerator::new(table, properties)?,
        })
    }

    /// Registers a join filter.
    pub fn with_join_filter(mut self, filter: Arc<dyn JoinFilter>) -> StorageResult<Self> {
        self.generator = self.generator.with_join_filter(filter)?;
        Ok(self)
    }

    /// Replaces the search limits.
    pub fn with_search_config(mut self, config: SearchConfig) -> Self {
        self.generator = self.generator.with_config(config);
        self
    }

    /// The table name.
    pub fn table(&self) -> &str {
        self.generator.table()
    }

    /// The table's property set.
    pub fn properties(&self) -> &Arc<PropertySet> {
        self.generator.properties()
    }

    /// The query generator.
    pub fn generator(&self) -> &QueryGenerator {
        &self.generator
    }

    /// Creates an empty record for this table.
    pub fn new_record(&self) -> Record {
        Record::new(self.properties().clone())
    }

    /// Looks up a row by a single-column primary key.
    pub fn find(&self, id: &Value) -> StorageResult<Option<Row>> {
        self.find_by_key(std::slice::from_ref(id))
    }

    /// Looks up a row by primary key values, in key declaration order.
    pub fn find_by_key(&self, key: &[Value]) -> StorageResult<Option<Row>> {
        let condition = self.key_condition(key, 1)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} LIMIT 1",
            self.table(),
            condition.sql
        );
        tracing::debug!(sql = %sql, "find by key");
        Ok(self.connection.select(&sql, &condition.params)?.into_iter().next())
    }

    /// Like [`TableRepository::find`], failing with `NotFound` when absent.
    pub fn get(&self, id: &Value) -> StorageResult<Row> {
        self.find(id)?.ok_or_else(|| {
            ResourceError::NotFound {
                table: self.table().to_string(),
                id: display_value(id),
            }
            .into()
        })
    }

    /// Loads a row as a [`Record`].
    pub fn get_record(&self, id: &Value) -> StorageResult<Record> {
        Ok(Record::from_row(self.properties().clone(), self.get(id)?))
    }

    /// Runs a search and folds joined rows into entities.
    pub fn search(&self, builder: &SearchQueryBuilder) -> StorageResult<Vec<Row>> {
        let output = self.generator.create_query(builder)?;
        let rows = self.run(&output)?;
        Ok(output.fold(rows))
    }

    /// Runs a search and builds a model from every folded entity.
    pub fn search_models<M, F>(
        &self,
        builder: &SearchQueryBuilder,
        mut build: F,
    ) -> StorageResult<Vec<M>>
    where
        F: FnMut(Row) -> StorageResult<M>,
    {
        self.search(builder)?.into_iter().map(&mut build).collect()
    }

    /// Runs a search returning [`Record`]s.
    pub fn search_records(&self, builder: &SearchQueryBuilder) -> StorageResult<Vec<Record>> {
        let properties = self.properties().clone();
        self.search_models(builder, |row| Ok(Record::from_row(properties.clone(), row)))
    }

    /// Counts the entities matching a search.
    pub fn count(&self, builder: &SearchQueryBuilder) -> StorageResult<u64> {
        let output = self.generator.create_count_query(builder)?;
        let rows = self.run(&output)?;
        let total = rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(total)
    }

    /// Streams every matching row to `f` without paging or folding.
    pub fn stream<F>(&self, builder: &SearchQueryBuilder, mut f: F) -> StorageResult<()>
    where
        F: FnMut(Row) -> StorageResult<()>,
    {
        let output = self.generator.create_query(&builder.clone().without_limit())?;
        self.connection
            .for_each_row(output.sql(), output.values(), &mut f)
    }

    /// Runs `f` while holding the named advisory lock.
    ///
    /// The lock is released whether `f` succeeds or not.
    pub fn with_advisory_lock<T, F>(&self, name: &str, f: F) -> StorageResult<T>
    where
        F: FnOnce() -> StorageResult<T>,
    {
        self.connection.acquire_lock(name)?;
        let result = f();
        match self.connection.release_lock(name) {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(e),
            Err(e) => {
                tracing::warn!(lock = name, "failed to release advisory lock: {}", e);
                result
            }
        }
    }

    /// Runs `f` while holding an exclusive lock on this table.
    ///
    /// Fails when the connection is already inside a transaction. Work done
    /// by `f` is committed when the lock is released, or rolled back when
    /// `f` fails.
    pub fn with_table_lock<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce() -> StorageResult<T>,
    {
        self.connection.lock_tables(&[self.table()])?;
        match f() {
            Ok(value) => {
                self.connection.unlock_tables()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.connection.rollback() {
                    tracing::warn!(
                        table = self.table(),
                        "rollback after failed table lock body failed: {}",
                        rollback
                    );
                }
                Err(e)
            }
        }
    }

    fn run(&self, output: &QueryOutput) -> StorageResult<Vec<Row>> {
        self.connection.select(output.sql(), output.values())
    }

    /// `pk1 = ?n AND pk2 = ?n+1`, numbering placeholders from `first`.
    fn key_condition(&self, key: &[Value], first: usize) -> StorageResult<SqlFragment> {
        let columns = self.properties().primary_keys();
        if columns.len() != key.len() {
            return Err(ConfigurationError::InvalidOperand {
                attribute: columns.join(", "),
                operator: "=".to_string(),
                message: format!("expected {} key value(s), got {}", columns.len(), key.len()),
            }
            .into());
        }
        let mut parts = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(columns.len());
        for (offset, (column, value)) in columns.iter().zip(key).enumerate() {
            parts.push(format!("{} = ?{}", ensure_identifier(column)?, first + offset));
            params.push(SqlParam::from_value(value));
        }
        Ok(SqlFragment::with_params(parts.join(" AND "), params))
    }

    fn insert(&self, model: &mut dyn Model) -> StorageResult<()> {
        let mut columns = Vec::new();
        let mut fragment = SqlFragment::default();
        let mut placeholders = Vec::new();
        for property in self.properties().iter() {
            let Some(value) = model.get(property.name()) else {
                continue;
            };
            if property.is_primary_key() && value.is_null() {
                continue;
            }
            columns.push(ensure_identifier(property.name())?.to_string());
            placeholders.push(fragment.add_param(SqlParam::from_value(value)));
        }

        fragment.sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table(),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        tracing::debug!(sql = %fragment.sql, "insert");
        self.connection.execute(&fragment.sql, &fragment.params)?;

        let keys = self.properties().primary_keys();
        if let [key] = keys.as_slice()
            && model.get(key).is_none_or(Value::is_null)
        {
            let id = self.connection.last_insert_id()?;
            model.set(key, Value::from(id))?;
        }
        Ok(())
    }

    fn update(&self, model: &mut dyn Model) -> StorageResult<()> {
        let edited: Vec<String> = model
            .edited_properties()
            .into_iter()
            .filter(|name| !self.properties().is_primary_key(name))
            .collect();
        if edited.is_empty() {
            tracing::debug!(table = self.table(), "no edited columns, skipping update");
            return Ok(());
        }

        let mut fragment = SqlFragment::default();
        let mut assignments = Vec::with_capacity(edited.len());
        for name in &edited {
            let value = model.get(name).cloned().unwrap_or(Value::Null);
            let placeholder = fragment.add_param(SqlParam::from_value(&value));
            assignments.push(format!("{} = {}", ensure_identifier(name)?, placeholder));
        }

        let key: Vec<Value> = model.primary_key_values().into_iter().map(|(_, v)| v).collect();
        let condition = self.key_condition(&key, fragment.params.len() + 1)?;
        fragment.sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table(),
            assignments.join(", "),
            condition.sql
        );
        fragment.params.extend(condition.params);

        tracing::debug!(sql = %fragment.sql, "update");
        let affected = self.connection.execute(&fragment.sql, &fragment.params)?;
        if affected == 0 {
            return Err(ResourceError::NotFound {
                table: self.table().to_string(),
                id: key.iter().map(display_value).collect::<Vec<_>>().join(","),
            }
            .into());
        }
        Ok(())
    }
}

impl Persister for TableRepository {
    fn connection(&self) -> &SharedConnection {
        &self.connection
    }

    fn persist(&self, model: &mut dyn Model) -> StorageResult<()> {
        if model.has_primary_key_value() {
            self.update(model)
        } else {
            self.insert(model)
        }
    }
}

impl fmt::Debug for TableRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRepository")
            .field("connection", &self.connection.id())
            .field("generator", &self.generator)
            .finish()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
