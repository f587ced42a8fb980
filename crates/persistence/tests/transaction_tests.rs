//! Multi-connection transaction tests against SQLite.
//!
//! Chains that span connections use one database per connection: SQLite
//! allows a single writer per database, so two connections to the same file
//! cannot both hold a write transaction.

#![cfg(feature = "sqlite")]

mod common;

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use quarry_persistence::core::{
    Capability, ChainedTransactionManager, ConnectedTask, ConnectionTransaction, Model, Runnable,
    SharedConnection, Task, Transaction, TransactionFactory, connection_transaction,
};
use quarry_persistence::error::{StorageError, TransactionError};
use quarry_persistence::lifecycle::{LazySaveUnit, SaveUnit};
use quarry_persistence::query::{SearchQueryBuilder, SqlParam};
use quarry_persistence::types::Record;
use quarry_persistence::{SaveLifecycle, StorageResult, TableRepository};

use common::*;

fn insert_vendor<'a>(
    connection: &'a SharedConnection,
    name: &'static str,
) -> Box<dyn Runnable + 'a> {
    Box::new(ConnectedTask::new(connection.clone(), move || {
        connection
            .execute("INSERT INTO vendor (name) VALUES (?1)", &[SqlParam::string(name)])
            .map(|_| ())
    }))
}

fn vendor_count(connection: &SharedConnection) -> i64 {
    let rows = connection
        .select("SELECT count(*) AS total FROM vendor", &[])
        .unwrap();
    rows[0]["total"].as_i64().unwrap()
}

fn failing<'a>(connection: &SharedConnection) -> Box<dyn Runnable + 'a> {
    Box::new(ConnectedTask::new(connection.clone(), || {
        Err(StorageError::Transaction(TransactionError::RolledBack {
            reason: "unit failed".to_string(),
        }))
    }))
}

// ============================================================================
// Chains across databases
// ============================================================================

#[test]
fn test_chain_commits_every_database() {
    let east = Catalog::new();
    let west = Catalog::new();
    let east_conn = east.backend.connection().unwrap();
    let west_conn = west.backend.connection().unwrap();

    TransactionFactory::default()
        .execute(vec![
            insert_vendor(&east_conn, "Acme"),
            insert_vendor(&west_conn, "Globex"),
            insert_vendor(&east_conn, "Initech"),
        ])
        .unwrap();

    assert!(!east_conn.in_transaction());
    assert!(!west_conn.in_transaction());
    assert_eq!(vendor_count(&east_conn), 2);
    assert_eq!(vendor_count(&west_conn), 1);
}

#[test]
fn test_failure_in_later_unit_rolls_back_every_database() {
    let east = Catalog::new();
    let west = Catalog::new();
    let east_conn = east.backend.connection().unwrap();
    let west_conn = west.backend.connection().unwrap();

    let result = TransactionFactory::default().execute(vec![
        insert_vendor(&east_conn, "Acme"),
        insert_vendor(&west_conn, "Globex"),
        failing(&west_conn),
    ]);

    assert!(result.is_err());
    assert!(!east_conn.in_transaction());
    assert!(!west_conn.in_transaction());
    assert_eq!(vendor_count(&east_conn), 0);
    assert_eq!(vendor_count(&west_conn), 0);
}

#[test]
fn test_commit_failure_after_first_commit_is_partial() {
    let east = Catalog::new();
    let west = Catalog::new();
    west.backend
        .execute_batch(
            "CREATE TABLE review (
                id INTEGER PRIMARY KEY,
                product_id INTEGER NOT NULL
                    REFERENCES product(id) DEFERRABLE INITIALLY DEFERRED
            )",
        )
        .unwrap();
    let east_conn = east.backend.connection().unwrap();
    let west_conn = west.backend.connection().unwrap();

    // The orphan review only fails when its transaction commits.
    let orphan: Box<dyn Runnable + '_> = Box::new(ConnectedTask::new(west_conn.clone(), || {
        west_conn
            .execute("INSERT INTO review (product_id) VALUES (42)", &[])
            .map(|_| ())
    }));
    let transactions = vec![
        connection_transaction(vec![insert_vendor(&east_conn, "Acme")]).unwrap(),
        connection_transaction(vec![orphan]).unwrap(),
    ];

    let err = ChainedTransactionManager::new(transactions)
        .execute()
        .unwrap_err();
    match err {
        StorageError::Transaction(TransactionError::PartialChainFailure {
            committed,
            failed_at,
            total,
            ..
        }) => {
            assert_eq!((committed, failed_at, total), (1, 2, 2));
        }
        other => panic!("expected a partial chain failure, got {other}"),
    }

    assert_eq!(vendor_count(&east_conn), 1);
    assert!(!west_conn.in_transaction());
    let reviews = west_conn
        .select("SELECT count(*) AS total FROM review", &[])
        .unwrap();
    assert_eq!(reviews[0]["total"], json!(0));
}

#[test]
fn test_factory_reports_partial_commit_across_connections() {
    let east = Catalog::new();
    let west = Catalog::new();
    west.backend
        .execute_batch(
            "CREATE TABLE review (
                id INTEGER PRIMARY KEY,
                product_id INTEGER NOT NULL
                    REFERENCES product(id) DEFERRABLE INITIALLY DEFERRED
            )",
        )
        .unwrap();
    let east_conn = east.backend.connection().unwrap();
    let west_conn = west.backend.connection().unwrap();

    let orphan: Box<dyn Runnable + '_> = Box::new(ConnectedTask::new(west_conn.clone(), || {
        west_conn
            .execute("INSERT INTO review (product_id) VALUES (42)", &[])
            .map(|_| ())
    }));

    let err = TransactionFactory::default()
        .execute(vec![insert_vendor(&east_conn, "Acme"), orphan])
        .unwrap_err();
    match err {
        StorageError::Transaction(TransactionError::PartialChainFailure {
            committed,
            failed_at,
            total,
            ..
        }) => {
            assert_eq!((committed, failed_at, total), (1, 2, 2));
        }
        other => panic!("expected a partial chain failure, got {other}"),
    }

    assert_eq!(vendor_count(&east_conn), 1);
    assert!(!west_conn.in_transaction());
}

// ============================================================================
// Execute and try
// ============================================================================

#[test]
fn test_check_sees_uncommitted_writes_and_can_veto() {
    let catalog = Catalog::new();
    let conn = catalog.backend.connection().unwrap();
    let seen = Mutex::new(0);

    let result = TransactionFactory::default().execute_and_try(
        vec![insert_vendor(&conn, "Acme"), insert_vendor(&conn, "Acme")],
        || {
            let rows = conn.select(
                "SELECT count(*) AS total FROM vendor WHERE name = 'Acme'",
                &[],
            )?;
            let total = rows[0]["total"].as_i64().unwrap_or_default();
            *seen.lock() = total;
            if total > 1 {
                return Err(StorageError::Transaction(TransactionError::RolledBack {
                    reason: "duplicate vendor".to_string(),
                }));
            }
            Ok(())
        },
    );

    assert!(result.is_err());
    assert_eq!(*seen.lock(), 2);
    assert_eq!(vendor_count(&conn), 0);
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_units_sharing_a_connection_share_its_transaction() {
    let catalog = Catalog::new();
    let conn = catalog.backend.connection().unwrap();
    let other = catalog.backend.connection().unwrap();

    let units = vec![insert_vendor(&conn, "Acme"), insert_vendor(&conn, "Globex")];
    let mut tx = ConnectionTransaction::new(units).unwrap();
    assert_eq!(tx.connection_order(), vec![conn.id()]);
    assert_eq!(tx.unit_count(), 2);

    tx.begin().unwrap();
    assert!(tx.owns(conn.id()));
    tx.run().unwrap();
    assert_eq!(vendor_count(&other), 0);
    tx.commit().unwrap();
    assert_eq!(vendor_count(&other), 2);
}

#[test]
fn test_plain_units_run_alongside_connected_ones() {
    let catalog = Catalog::new();
    let conn = catalog.backend.connection().unwrap();
    let trace = Mutex::new(Vec::new());

    let plain: Box<dyn Runnable + '_> = Box::new(Task::new(|| {
        trace.lock().push("plain");
        Ok(())
    }));
    assert_eq!(plain.capability(), Capability::Plain);

    TransactionFactory::default()
        .execute(vec![insert_vendor(&conn, "Acme"), plain])
        .unwrap();

    assert_eq!(*trace.lock(), vec!["plain"]);
    assert_eq!(vendor_count(&conn), 1);
}

#[test]
fn test_factory_requires_every_capability() {
    let err = TransactionFactory::builder()
        .register(Capability::Connected, connection_transaction)
        .build()
        .unwrap_err();
    assert!(err.is_configuration());
}

// ============================================================================
// Save units
// ============================================================================

#[test]
fn test_lazy_unit_reads_ids_generated_by_earlier_unit() {
    let catalog = Catalog::new();
    let conn = catalog.backend.connection().unwrap();
    let vendors = Arc::new(
        TableRepository::new(conn.clone(), "vendor", Arc::new(vendor_properties())).unwrap(),
    );
    let products = Arc::new(product_repository(conn.clone()));
    let vendor_lifecycle = SaveLifecycle::new(vendors.clone());
    let product_lifecycle = SaveLifecycle::new(products.clone());

    let vendor = RefCell::new(vendors.new_record().with("name", json!("Acme")).unwrap());
    let eager = SaveUnit::new(&vendor_lifecycle, vec![&vendor as &RefCell<dyn Model>]);
    let lazy = LazySaveUnit::new(&product_lifecycle, || -> StorageResult<Vec<Box<dyn Model>>> {
        let vendor_id = vendor.borrow().get("id").cloned().unwrap_or_default();
        let product: Record = products
            .new_record()
            .with("sku", json!("A-1"))?
            .with("vendor_id", vendor_id)?;
        Ok(vec![Box::new(product)])
    });

    TransactionFactory::default()
        .execute(vec![Box::new(eager), Box::new(lazy)])
        .unwrap();

    let vendor_id = id_of(&vendor.borrow());
    let found = products
        .search(&SearchQueryBuilder::new().and("vendor_id", json!(vendor_id)))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["sku"], json!("A-1"));
}

#[test]
fn test_failed_lazy_unit_rolls_back_eager_save() {
    let catalog = Catalog::new();
    let conn = catalog.backend.connection().unwrap();
    let vendors = Arc::new(
        TableRepository::new(conn.clone(), "vendor", Arc::new(vendor_properties())).unwrap(),
    );
    let products = Arc::new(product_repository(conn.clone()));
    let vendor_lifecycle = SaveLifecycle::new(vendors.clone());
    let product_lifecycle = SaveLifecycle::new(products.clone());

    let vendor = RefCell::new(vendors.new_record().with("name", json!("Acme")).unwrap());
    let eager = SaveUnit::new(&vendor_lifecycle, vec![&vendor as &RefCell<dyn Model>]);
    // A product without a SKU fails validation inside the transaction.
    let lazy = LazySaveUnit::new(&product_lifecycle, || -> StorageResult<Vec<Box<dyn Model>>> {
        Ok(vec![Box::new(products.new_record())])
    });

    let err = TransactionFactory::default()
        .execute(vec![Box::new(eager), Box::new(lazy)])
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!conn.in_transaction());
    assert_eq!(vendor_count(&conn), 0);
}
