//! Folding of joined result rows into entities.

use std::collections::HashMap;

use serde_json::Value;

use crate::core::Row;

static NULL: Value = Value::Null;

/// Merges rows that describe the same entity.
///
/// Rows are keyed by the values of `key_columns` followed by
/// `entity_groups`. Rows sharing a key are merged column by column, later
/// values overwriting earlier ones. Entities come out in the order their key
/// was first seen.
pub fn fold_rows(rows: Vec<Row>, key_columns: &[String], entity_groups: &[String]) -> Vec<Row> {
    let mut entities: Vec<Row> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = entity_key(&row, key_columns, entity_groups);
        match index.get(&key) {
            Some(&position) => {
                let entity = &mut entities[position];
                for (column, value) in row {
                    entity.insert(column, value);
                }
            }
            None => {
                index.insert(key, entities.len());
                entities.push(row);
            }
        }
    }

    entities
}

fn entity_key(row: &Row, key_columns: &[String], entity_groups: &[String]) -> String {
    let values: Vec<&Value> = key_columns
        .iter()
        .chain(entity_groups)
        .map(|column| row.get(column).unwrap_or(&NULL))
        .collect();
    // Value serialization cannot fail for values that came out of a Row.
    serde_json::to_string(&values).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn joined_rows() -> Vec<Row> {
        vec![
            row(json!({"id": 1, "sku": "A", "vendor.name": "Acme"})),
            row(json!({"id": 1, "sku": "A", "vendor.name": "Globex"})),
            row(json!({"id": 2, "sku": "B", "vendor.name": "Acme"})),
        ]
    }

    #[test]
    fn test_fold_by_primary_key_last_value_wins() {
        let entities = fold_rows(joined_rows(), &["id".to_string()], &[]);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0]["id"], json!(1));
        assert_eq!(entities[0]["vendor.name"], json!("Globex"));
        assert_eq!(entities[1]["id"], json!(2));
    }

    #[test]
    fn test_entity_group_splits_entities() {
        let entities = fold_rows(
            joined_rows(),
            &["id".to_string()],
            &["vendor.name".to_string()],
        );
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0]["vendor.name"], json!("Acme"));
        assert_eq!(entities[1]["vendor.name"], json!("Globex"));
    }

    #[test]
    fn test_columns_accumulate() {
        let rows = vec![
            row(json!({"id": 1, "color.value": "red"})),
            row(json!({"id": 1, "size.value": "L"})),
        ];
        let entities = fold_rows(rows, &["id".to_string()], &[]);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0]["color.value"], json!("red"));
        assert_eq!(entities[0]["size.value"], json!("L"));
    }

    #[test]
    fn test_integer_and_string_keys_differ() {
        let rows = vec![row(json!({"id": 1})), row(json!({"id": "1"}))];
        assert_eq!(fold_rows(rows, &["id".to_string()], &[]).len(), 2);
    }
}
