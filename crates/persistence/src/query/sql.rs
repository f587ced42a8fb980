//! SQL fragments, bound parameters and the identifier guard.
//!
//! Literal values never reach SQL text: they are pushed as [`SqlParam`]s behind
//! numbered placeholders (`?1`, `?2`, ...). Table and column names are the only
//! string-assembled parts, and every one of them goes through
//! [`ensure_identifier`] first.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigurationError, StorageResult};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is a valid regex")
});

/// Returns the identifier unchanged if it only contains `[A-Za-z0-9_]`.
///
/// This is the single guard shared by the query generator, the repository and
/// every join filter implementation. Names that fail it are rejected with
/// [`ConfigurationError::InvalidIdentifier`].
pub fn ensure_identifier(identifier: &str) -> StorageResult<&str> {
    if IDENTIFIER.is_match(identifier) {
        Ok(identifier)
    } else {
        Err(ConfigurationError::InvalidIdentifier {
            identifier: identifier.to_string(),
        }
        .into())
    }
}

/// Returns `alias.column` after checking both parts.
pub fn qualified(alias: &str, column: &str) -> StorageResult<String> {
    Ok(format!(
        "{}.{}",
        ensure_identifier(alias)?,
        ensure_identifier(column)?
    ))
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }

    /// Creates a float parameter.
    pub fn float(f: f64) -> Self {
        SqlParam::Float(f)
    }

    /// Converts a JSON value into a bindable parameter.
    ///
    /// Booleans bind as 0/1; arrays and objects bind as their JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Integer(i),
                None => SqlParam::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlParam::String(s.clone()),
            other => SqlParam::String(other.to_string()),
        }
    }
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        SqlParam::from_value(value)
    }
}

/// A fragment of SQL with bound parameters.
///
/// Placeholders are numbered from the fragment's own parameter list, so a
/// fragment that is going to be embedded in a larger statement has to be
/// created through a shared [`ParamBinder`].
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Adds a parameter placeholder and returns the placeholder string.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Hands out uniquely numbered placeholders for one statement.
#[derive(Debug, Default)]
pub struct ParamBinder {
    params: Vec<SqlParam>,
}

impl ParamBinder {
    /// Creates an empty binder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value and returns its placeholder.
    pub fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    /// Number of values bound so far.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Consumes the binder, returning values in placeholder order.
    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}
