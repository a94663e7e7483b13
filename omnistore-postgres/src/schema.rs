//! Schema inference from JSON payloads.

use chrono::{DateTime, Utc};
use serde_json::Value;

use omnistore_dao::is_valid_identifier;
use omnistore_model::entity::Document;

/// Columns every dynamically-created table carries besides the payload.
pub const META_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "_metadata"];

/// Infer the SQL column type for a JSON value.
///
/// Strings in RFC3339 shape are treated as timestamps; arrays and objects
/// land in JSONB; nulls default to TEXT.
pub fn infer_column_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "TEXT",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(n) if n.is_i64() || n.is_u64() => "BIGINT",
        Value::Number(_) => "DOUBLE PRECISION",
        Value::String(s) if parse_timestamp(s).is_some() => "TIMESTAMPTZ",
        Value::String(_) => "TEXT",
        Value::Array(_) | Value::Object(_) => "JSONB",
    }
}

/// Parse an RFC3339 timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Build the CREATE TABLE statement for a payload.
///
/// Unsafe column names are skipped (the caller logs them); id and the audit
/// columns are always present.
pub fn create_table_sql(table: &str, payload: &Document) -> (String, Vec<String>) {
    let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
    let mut skipped = Vec::new();
    for (key, value) in payload {
        if META_COLUMNS.contains(&key.as_str()) {
            continue;
        }
        if !is_valid_identifier(key) {
            skipped.push(key.clone());
            continue;
        }
        columns.push(format!("{key} {}", infer_column_type(value)));
    }
    columns.extend([
        "created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP".to_string(),
        "updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP".to_string(),
        "_metadata JSONB DEFAULT '{}'::jsonb".to_string(),
    ]);
    (
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    {}\n)",
            columns.join(",\n    ")
        ),
        skipped,
    )
}

/// Index statements for a fresh table: GIN on JSONB columns, BTREE on
/// timestamp columns.
pub fn bootstrap_index_sqls(table: &str, payload: &Document) -> Vec<String> {
    let mut statements = Vec::new();
    for (key, value) in payload {
        if META_COLUMNS.contains(&key.as_str()) || !is_valid_identifier(key) {
            continue;
        }
        match infer_column_type(value) {
            "JSONB" => statements.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{key}_gin ON {table} USING gin ({key})"
            )),
            "TIMESTAMPTZ" => statements.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{key}_btree ON {table} ({key})"
            )),
            _ => {}
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn types_infer_from_values() {
        assert_eq!(infer_column_type(&json!("x")), "TEXT");
        assert_eq!(infer_column_type(&json!(true)), "BOOLEAN");
        assert_eq!(infer_column_type(&json!(1)), "BIGINT");
        assert_eq!(infer_column_type(&json!(3.14)), "DOUBLE PRECISION");
        assert_eq!(infer_column_type(&json!([1])), "JSONB");
        assert_eq!(infer_column_type(&json!({"a": 1})), "JSONB");
        assert_eq!(infer_column_type(&Value::Null), "TEXT");
        assert_eq!(
            infer_column_type(&json!("2024-05-01T10:00:00Z")),
            "TIMESTAMPTZ"
        );
    }

    #[test]
    fn create_table_includes_payload_and_audit_columns() {
        let (sql, skipped) = create_table_sql("events", &doc(json!({"a": 1, "b": "x"})));
        assert!(sql.contains("id TEXT PRIMARY KEY"));
        assert!(sql.contains("a BIGINT"));
        assert!(sql.contains("b TEXT"));
        assert!(sql.contains("created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP"));
        assert!(sql.contains("_metadata JSONB DEFAULT '{}'::jsonb"));
        assert!(skipped.is_empty());
    }

    #[test]
    fn unsafe_columns_are_reported_not_spliced() {
        let (sql, skipped) = create_table_sql("events", &doc(json!({"good": 1, "bad;col": 2})));
        assert!(sql.contains("good BIGINT"));
        assert!(!sql.contains("bad;col"));
        assert_eq!(skipped, vec!["bad;col".to_string()]);
    }

    #[test]
    fn bootstrap_indexes_cover_jsonb_and_timestamps() {
        let statements = bootstrap_index_sqls(
            "events",
            &doc(json!({
                "payload": {"k": 1},
                "happened_at": "2024-05-01T10:00:00Z",
                "n": 1
            })),
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("USING gin (payload)"));
        assert!(statements[1].contains("idx_events_happened_at_btree"));
    }
}
