//! Mirror record construction from arbitrary primary rows

use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use studysync::backend::replication::MirrorRecord;

proptest! {
    #[test]
    fn test_string_ids_become_original_id(id in "[a-zA-Z0-9_-]{1,24}", name in ".*") {
        let record = MirrorRecord::from_primary("users", &json!({"id": id, "name": name}), Utc::now()).unwrap();
        prop_assert_eq!(&record.original_id, &id);
        prop_assert_eq!(record.fields.get("name"), Some(&Value::String(name)));
        prop_assert!(!record.fields.contains_key("id"));
    }

    #[test]
    fn test_numeric_ids_are_stringified(id in any::<i64>()) {
        let record = MirrorRecord::from_primary("tasks", &json!({"id": id}), Utc::now()).unwrap();
        prop_assert_eq!(record.original_id, id.to_string());
    }

    #[test]
    fn test_other_fields_are_copied(
        fields in proptest::collection::btree_map("[a-z]{1,8}", any::<i32>(), 0..8),
    ) {
        let mut row: Map<String, Value> = fields
            .iter()
            .map(|(key, value)| (key.clone(), json!(value)))
            .collect();
        row.insert("id".to_string(), json!("r1"));

        let record = MirrorRecord::from_primary("reports", &Value::Object(row), Utc::now()).unwrap();
        let expected = fields.keys().filter(|key| key.as_str() != "id").count();
        prop_assert_eq!(record.fields.len(), expected);
    }
}
