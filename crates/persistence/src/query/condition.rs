//! The search condition builder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigurationError, StorageError};
use crate::types::{Page, Paging};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// `=`, or `IS NULL` against null.
    Eq,
    /// `!=`, or `IS NOT NULL` against null.
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `LIKE`
    Like,
    /// `IN (...)`
    In,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "=" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            "like" => Ok(Operator::Like),
            "in" => Ok(Operator::In),
            _ => Err(ConfigurationError::InvalidOperand {
                attribute: String::new(),
                operator: s.to_string(),
                message: "unknown operator".to_string(),
            }
            .into()),
        }
    }
}

/// How a condition is combined with the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    /// Part of the AND block.
    And,
    /// Part of the OR block.
    Or,
}

/// One predicate of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Attribute name: a property, an embedded column, `filter` or `filter.sub`.
    pub attribute: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Operand; an array for [`Operator::In`].
    pub value: Value,
    /// Block this condition belongs to.
    pub conjunction: Conjunction,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A sort column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortColumn {
    /// Attribute to sort on.
    pub attribute: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Declarative description of a search.
///
/// Conditions live in buckets keyed by conjunction and operator. Within a
/// bucket an attribute appears once: adding it again replaces the earlier
/// value in place.
///
/// Nothing is validated here; [`QueryGenerator::create_query`] checks every
/// name against the property set and join filters.
///
/// [`QueryGenerator::create_query`]: super::QueryGenerator::create_query
///
/// # Example
///
/// ```
/// use quarry_persistence::query::{Operator, SearchQueryBuilder};
/// use serde_json::json;
///
/// let builder = SearchQueryBuilder::new()
///     .attributes(["id", "status"])
///     .and("status", json!("active"))
///     .and_op("price_amount", Operator::Ge, json!(10))
///     .page(2, 10);
/// assert_eq!(builder.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQueryBuilder {
    attributes: Option<Vec<String>>,
    conditions: Vec<Condition>,
    paging: Paging,
    order: Vec<SortColumn>,
    entity_groups: Vec<String>,
}

impl SearchQueryBuilder {
    /// Creates a builder selecting every column of the entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `attribute = value` to the AND block.
    pub fn and(self, attribute: impl Into<String>, value: Value) -> Self {
        self.and_op(attribute, Operator::Eq, value)
    }

    /// Adds a condition to the AND block.
    pub fn and_op(self, attribute: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.push(Conjunction::And, attribute.into(), operator, value)
    }

    /// Adds `attribute IN (values)` to the AND block.
    pub fn and_in<I>(self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let values = Value::Array(values.into_iter().collect());
        self.push(Conjunction::And, attribute.into(), Operator::In, values)
    }

    /// Adds `attribute = value` to the OR block.
    pub fn or(self, attribute: impl Into<String>, value: Value) -> Self {
        self.or_op(attribute, Operator::Eq, value)
    }

    /// Adds a condition to the OR block.
    pub fn or_op(self, attribute: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.push(Conjunction::Or, attribute.into(), operator, value)
    }

    /// Adds `attribute IN (values)` to the OR block.
    pub fn or_in<I>(self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let values = Value::Array(values.into_iter().collect());
        self.push(Conjunction::Or, attribute.into(), Operator::In, values)
    }

    /// Selects explicit attributes instead of every column.
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Goes back to selecting every column.
    pub fn all_attributes(mut self) -> Self {
        self.attributes = None;
        self
    }

    /// Requests a 1-based page.
    pub fn page(mut self, number: u32, size: u32) -> Self {
        self.paging = Paging::Page(Page::new(number, size));
        self
    }

    /// Removes the LIMIT clause.
    pub fn without_limit(mut self) -> Self {
        self.paging = Paging::Unlimited;
        self
    }

    /// Appends a sort column.
    pub fn order_by(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(SortColumn {
            attribute: attribute.into(),
            direction,
        });
        self
    }

    /// Sets the columns that, with the primary key, identify a folded entity.
    pub fn entity_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    fn push(
        mut self,
        conjunction: Conjunction,
        attribute: String,
        operator: Operator,
        value: Value,
    ) -> Self {
        let existing = self.conditions.iter_mut().find(|c| {
            c.conjunction == conjunction && c.operator == operator && c.attribute == attribute
        });
        match existing {
            Some(condition) => condition.value = value,
            None => self.conditions.push(Condition {
                attribute,
                operator,
                value,
                conjunction,
            }),
        }
        self
    }

    /// Selected attributes, or `None` for every column.
    pub fn selected_attributes(&self) -> Option<&[String]> {
        self.attributes.as_deref()
    }

    /// All conditions in insertion order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Conditions of one block, in insertion order.
    pub fn conditions_for(&self, conjunction: Conjunction) -> impl Iterator<Item = &Condition> {
        self.conditions
            .iter()
            .filter(move |c| c.conjunction == conjunction)
    }

    /// Requested paging.
    pub fn paging(&self) -> Paging {
        self.paging
    }

    /// Sort columns in order.
    pub fn ordering(&self) -> &[SortColumn] {
        &self.order
    }

    /// Entity-group attributes.
    pub fn entity_group_attributes(&self) -> &[String] {
        &self.entity_groups
    }
}
