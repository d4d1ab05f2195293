//! Bracket-notation flattening of nested parameters, as form-encoded
//! billing APIs expect: `metadata[plan]=pro`, `line_items[0][price]=p_1`.

use serde_json::Value;

/// Flatten a parameter object into ordered `(key, value)` pairs.
/// `null` values are skipped.
pub fn flatten(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            push(&mut pairs, key.clone(), value);
        }
    }
    pairs
}

fn push(pairs: &mut Vec<(String, String)>, key: String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => pairs.push((key, b.to_string())),
        Value::Number(n) => pairs.push((key, n.to_string())),
        Value::String(s) => pairs.push((key, s.clone())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                push(pairs, format!("{}[{}]", key, i), item);
            }
        }
        Value::Object(map) => {
            for (child, item) in map {
                push(pairs, format!("{}[{}]", key, child), item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        let mut pairs = flatten(&json!({"limit": 10, "email": "a@b.c", "live": true, "skip": null}));
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("email".to_string(), "a@b.c".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("live".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested() {
        let mut pairs = flatten(&json!({
            "line_items": [{"price": "price_1", "quantity": 1}],
            "metadata": {"plan": "pro"}
        }));
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("line_items[0][price]".to_string(), "price_1".to_string()),
                ("line_items[0][quantity]".to_string(), "1".to_string()),
                ("metadata[plan]".to_string(), "pro".to_string()),
            ]
        );
    }
}
