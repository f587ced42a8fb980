//! Catalog fixtures shared by the integration tests.

use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use quarry_persistence::backends::sqlite::SqliteBackend;
use quarry_persistence::core::Model;
use quarry_persistence::query::{EmbeddedJoinFilter, ForeignJoinFilter};
use quarry_persistence::types::{PropertyDef, PropertySet, Record};
use quarry_persistence::{SaveLifecycle, TableRepository};

const SCHEMA: &str = "
    CREATE TABLE vendor (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        country TEXT
    );
    CREATE TABLE product (
        id INTEGER PRIMARY KEY,
        sku TEXT NOT NULL UNIQUE,
        status TEXT,
        vendor_id INTEGER REFERENCES vendor(id),
        price_amount REAL,
        price_currency TEXT
    );
    CREATE TABLE product_attribute (
        id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL REFERENCES product(id),
        code TEXT NOT NULL,
        value TEXT
    );
";

/// A catalog database in a temporary directory.
///
/// The directory lives as long as the catalog.
pub struct Catalog {
    pub backend: SqliteBackend,
    _dir: TempDir,
}

impl Catalog {
    /// Creates the database and its schema.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let backend =
            SqliteBackend::open(dir.path().join("catalog.db")).expect("Failed to open SQLite");
        backend.execute_batch(SCHEMA).expect("Failed to create schema");
        Self { backend, _dir: dir }
    }

    /// A product repository on a fresh connection, with every join filter.
    pub fn products(&self) -> Arc<TableRepository> {
        let connection = self.backend.connection().expect("Failed to get connection");
        Arc::new(product_repository(connection))
    }

    /// A vendor repository on a fresh connection.
    pub fn vendors(&self) -> Arc<TableRepository> {
        let connection = self.backend.connection().expect("Failed to get connection");
        Arc::new(
            TableRepository::new(connection, "vendor", Arc::new(vendor_properties())).unwrap(),
        )
    }

    /// A product attribute repository on a fresh connection.
    pub fn attributes(&self) -> Arc<TableRepository> {
        let connection = self.backend.connection().expect("Failed to get connection");
        Arc::new(
            TableRepository::new(
                connection,
                "product_attribute",
                Arc::new(attribute_properties()),
            )
            .unwrap(),
        )
    }

    /// Inserts a vendor and returns its id.
    pub fn insert_vendor(&self, name: &str, country: &str) -> i64 {
        let vendors = self.vendors();
        let mut record = vendors
            .new_record()
            .with("name", json!(name))
            .unwrap()
            .with("country", json!(country))
            .unwrap();
        SaveLifecycle::new(vendors.clone()).save(&mut record).unwrap();
        id_of(&record)
    }

    /// Inserts a product with an optional vendor and returns its id.
    pub fn insert_product(&self, sku: &str, status: &str, vendor_id: Option<i64>) -> i64 {
        let products = self.products();
        let mut record = products
            .new_record()
            .with("sku", json!(sku))
            .unwrap()
            .with("status", json!(status))
            .unwrap()
            .with("vendor_id", vendor_id.map_or(Value::Null, Value::from))
            .unwrap();
        SaveLifecycle::new(products.clone()).save(&mut record).unwrap();
        id_of(&record)
    }

    /// Inserts an EAV attribute row for a product.
    pub fn insert_attribute(&self, product_id: i64, code: &str, value: &str) {
        let attributes = self.attributes();
        let mut record = attributes
            .new_record()
            .with("product_id", json!(product_id))
            .unwrap()
            .with("code", json!(code))
            .unwrap()
            .with("value", json!(value))
            .unwrap();
        SaveLifecycle::new(attributes.clone()).save(&mut record).unwrap();
    }
}

/// Properties of the `product` table.
pub fn product_properties() -> PropertySet {
    PropertySet::new(vec![
        PropertyDef::primary("id"),
        PropertyDef::new("sku").required(),
        PropertyDef::new("status"),
        PropertyDef::new("vendor_id"),
    ])
    .unwrap()
    .with_embedded(
        "price",
        vec![PropertyDef::new("amount"), PropertyDef::new("currency")],
    )
    .unwrap()
}

/// Properties of the `vendor` table.
pub fn vendor_properties() -> PropertySet {
    PropertySet::new(vec![
        PropertyDef::primary("id"),
        PropertyDef::new("name").required(),
        PropertyDef::new("country"),
    ])
    .unwrap()
}

/// Properties of the `product_attribute` table.
pub fn attribute_properties() -> PropertySet {
    PropertySet::new(vec![
        PropertyDef::primary("id"),
        PropertyDef::new("product_id").required(),
        PropertyDef::new("code").required(),
        PropertyDef::new("value"),
    ])
    .unwrap()
}

/// Builds the product repository with `vendor`, `price`, `color` and `size` filters.
pub fn product_repository(
    connection: quarry_persistence::core::SharedConnection,
) -> TableRepository {
    let properties = Arc::new(product_properties());
    let price = EmbeddedJoinFilter::from_entity(&properties, "price").unwrap();
    let vendor =
        ForeignJoinFilter::new("vendor", "vendor", "vendor_id", "id", vendor_properties())
            .unwrap();
    TableRepository::new(connection, "product", properties)
        .unwrap()
        .with_join_filter(Arc::new(price))
        .unwrap()
        .with_join_filter(Arc::new(vendor))
        .unwrap()
        .with_join_filter(Arc::new(attribute_filter("color")))
        .unwrap()
        .with_join_filter(Arc::new(attribute_filter("size")))
        .unwrap()
}

/// An optional EAV filter reading `product_attribute` rows with `code = name`.
pub fn attribute_filter(name: &str) -> ForeignJoinFilter {
    ForeignJoinFilter::new(
        name,
        "product_attribute",
        "id",
        "product_id",
        attribute_properties(),
    )
    .unwrap()
    .with_discriminator("code", json!(name))
    .unwrap()
    .optional()
}

/// The integer primary key of a saved record.
pub fn id_of(record: &Record) -> i64 {
    record
        .get("id")
        .and_then(Value::as_i64)
        .expect("record has no generated id")
}
