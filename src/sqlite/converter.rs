// ABOUTME: SQLite to JSON scalar conversion for reconciliation records
// ABOUTME: Maps every SQLite storage class onto a scalar; BLOBs become base64 strings

use anyhow::Result;
use rusqlite::types::Value as SqliteValue;
use serde_json::Value as JsonValue;

/// Convert a single SQLite value to a JSON scalar
///
/// Maps SQLite types to JSON types:
/// - INTEGER → number (i64)
/// - REAL → number (f64), or string for NaN/Infinity
/// - TEXT → string
/// - BLOB → base64-encoded string
/// - NULL → null
///
/// Records handed to the engine must be flat scalars, so BLOBs are encoded
/// as plain strings rather than tagged objects.
///
/// # Examples
///
/// ```
/// # use collection_reconciler::sqlite::converter::sqlite_value_to_json;
/// # use rusqlite::types::Value;
/// let json = sqlite_value_to_json(&Value::Integer(42)).unwrap();
/// assert_eq!(json, serde_json::json!(42));
/// ```
pub fn sqlite_value_to_json(value: &SqliteValue) -> Result<JsonValue> {
    match value {
        SqliteValue::Null => Ok(JsonValue::Null),

        SqliteValue::Integer(i) => Ok(JsonValue::Number((*i).into())),

        SqliteValue::Real(f) => {
            // JSON can't represent NaN or Infinity
            if f.is_finite() {
                serde_json::Number::from_f64(*f)
                    .map(JsonValue::Number)
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert float {} to JSON number", f))
            } else {
                Ok(JsonValue::String(f.to_string()))
            }
        }

        SqliteValue::Text(s) => Ok(JsonValue::String(s.clone())),

        SqliteValue::Blob(b) => Ok(JsonValue::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_integer() {
        let result = sqlite_value_to_json(&SqliteValue::Integer(-7)).unwrap();
        assert_eq!(result, serde_json::json!(-7));
    }

    #[test]
    fn test_convert_real() {
        let result = sqlite_value_to_json(&SqliteValue::Real(2.5)).unwrap();
        assert_eq!(result, serde_json::json!(2.5));
    }

    #[test]
    fn test_convert_non_finite_real_to_string() {
        let result = sqlite_value_to_json(&SqliteValue::Real(f64::INFINITY)).unwrap();
        assert_eq!(result, serde_json::json!("inf"));
        let result = sqlite_value_to_json(&SqliteValue::Real(f64::NAN)).unwrap();
        assert_eq!(result, serde_json::json!("NaN"));
    }

    #[test]
    fn test_convert_text_and_null() {
        assert_eq!(
            sqlite_value_to_json(&SqliteValue::Text("A1".to_string())).unwrap(),
            serde_json::json!("A1")
        );
        assert_eq!(
            sqlite_value_to_json(&SqliteValue::Null).unwrap(),
            JsonValue::Null
        );
    }

    #[test]
    fn test_convert_blob_to_base64_string() {
        let result = sqlite_value_to_json(&SqliteValue::Blob(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(result, serde_json::json!("AQIDBA=="));
    }
}
