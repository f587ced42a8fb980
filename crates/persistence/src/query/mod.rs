//! Search compilation.
//!
//! A [`SearchQueryBuilder`] describes what to find. A [`QueryGenerator`]
//! checks it against an entity's [`PropertySet`](crate::types::PropertySet)
//! and its registered [`JoinFilter`]s and compiles it into a [`QueryOutput`]:
//! SQL text, bound values and the columns used to fold joined rows back into
//! entities.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quarry_persistence::query::{QueryGenerator, SearchQueryBuilder};
//! use quarry_persistence::types::{PropertyDef, PropertySet};
//! use serde_json::json;
//!
//! let properties = Arc::new(PropertySet::new(vec![
//!     PropertyDef::primary("id"),
//!     PropertyDef::new("status"),
//! ]).unwrap());
//! let generator = QueryGenerator::new("product", properties).unwrap();
//!
//! let output = generator
//!     .create_query(
//!         &SearchQueryBuilder::new()
//!             .and("status", json!("active"))
//!             .attributes(["id", "status"])
//!             .page(2, 10),
//!     )
//!     .unwrap();
//! assert!(output.sql().ends_with("LIMIT 10,10"));
//! assert_eq!(output.values().len(), 1);
//! ```

mod condition;
mod folding;
mod generator;
mod join_filter;
pub mod sql;

pub use condition::{
    Condition, Conjunction, Operator, SearchQueryBuilder, SortColumn, SortDirection,
};
pub use folding::fold_rows;
pub use generator::{QueryGenerator, QueryOutput};
pub use join_filter::{EmbeddedJoinFilter, ForeignJoinFilter, JoinFilter, QueryContext};
pub use sql::{SqlFragment, SqlParam, ensure_identifier};
