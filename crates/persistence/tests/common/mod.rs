//! Test infrastructure for the persistence layer.
//!
//! Provides a file-backed SQLite catalog (vendors, products and EAV product
//! attributes), the property sets describing it and repository builders.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;
