//! Schema and model types.
//!
//! - [`PropertySet`], [`PropertyDef`] - The columns a model persists
//! - [`Record`] - A generic model driven by a property set
//! - [`Paging`], [`Page`], [`SearchConfig`] - Search paging and its limits
//!
//! # Examples
//!
//! ## Declaring a Property Set
//!
//! ```
//! use quarry_persistence::types::{PropertyDef, PropertySet};
//!
//! let properties = PropertySet::new(vec![
//!     PropertyDef::primary("id"),
//!     PropertyDef::new("sku").required(),
//! ])
//! .unwrap()
//! .with_embedded("price", vec![PropertyDef::new("amount"), PropertyDef::new("currency")])
//! .unwrap();
//!
//! assert!(properties.contains("price_amount"));
//! assert_eq!(properties.primary_keys(), vec!["id"]);
//! ```

mod pagination;
mod property;
mod record;

pub use pagination::{MAX_PAGE_SIZE, Page, Paging, SearchConfig};
pub use property::{PropertyDef, PropertySet};
pub use record::Record;
