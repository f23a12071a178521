use serde_json::{Map, Value};

/// Computes the JSON merge patch (RFC 7386) that turns `before` into `after`.
///
/// Returns `None` when the two documents are identical, so callers can skip
/// the write entirely. Arrays are replaced as a whole, as merge patch demands.
pub fn merge_patch(before: &Value, after: &Value) -> Option<Value> {
    match (before, after) {
        (Value::Object(before), Value::Object(after)) => {
            let mut patch = Map::new();

            for (key, before_value) in before {
                match after.get(key) {
                    Some(after_value) => {
                        if let Some(diff) = merge_patch(before_value, after_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                }
            }

            for (key, after_value) in after {
                if !before.contains_key(key) {
                    patch.insert(key.clone(), after_value.clone());
                }
            }

            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        _ if before == after => None,
        _ => Some(after.clone()),
    }
}

/// Wraps a spec diff together with the resourceVersion it was computed against.
pub fn versioned_patch(resource_version: Option<&str>, field: &str, diff: Value) -> Value {
    let mut patch = Map::new();
    if let Some(resource_version) = resource_version {
        patch.insert(
            "metadata".to_string(),
            serde_json::json!({ "resourceVersion": resource_version }),
        );
    }
    patch.insert(field.to_string(), diff);
    Value::Object(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"a": 1}), json!({"a": 1}), None)]
    #[case(json!({"a": 1}), json!({"a": 2}), Some(json!({"a": 2})))]
    #[case(json!({"a": 1, "b": 2}), json!({"a": 1}), Some(json!({"b": null})))]
    #[case(json!({"a": {"b": 1, "c": 2}}), json!({"a": {"b": 1, "c": 3}}), Some(json!({"a": {"c": 3}})))]
    #[case(json!({"a": [1, 2]}), json!({"a": [1, 2, 3]}), Some(json!({"a": [1, 2, 3]})))]
    #[case(json!({}), json!({"a": {"b": true}}), Some(json!({"a": {"b": true}})))]
    #[case(json!("x"), json!({"a": 1}), Some(json!({"a": 1})))]
    fn test_merge_patch(
        #[case] before: Value,
        #[case] after: Value,
        #[case] expected: Option<Value>,
    ) {
        assert_eq!(merge_patch(&before, &after), expected);
    }

    #[test]
    fn test_versioned_patch_carries_resource_version() {
        let patch = versioned_patch(Some("42"), "spec", json!({"replicas": 2}));
        assert_eq!(
            patch,
            json!({"metadata": {"resourceVersion": "42"}, "spec": {"replicas": 2}})
        );
    }

    #[test]
    fn test_versioned_patch_without_resource_version() {
        let patch = versioned_patch(None, "spec", json!({"replicas": 2}));
        assert_eq!(patch, json!({"spec": {"replicas": 2}}));
    }
}
