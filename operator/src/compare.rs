use serde_json::{Map, Value};
use std::collections::HashSet;

/// Structural comparator used for drift detection between a desired and an
/// observed spec.
///
/// Both documents are normalised before comparison. Nulls and empty
/// collections count as missing, environment variables named in the ignore
/// list are removed from `env` lists, and resource quantities under
/// `limits`/`requests` are compared by value.
#[derive(Debug, Default, Clone)]
pub struct Comparator {
    ignored_env: HashSet<&'static str>,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ignore_env(mut self, names: &[&'static str]) -> Self {
        self.ignored_env.extend(names);
        self
    }

    pub fn equivalent(&self, desired: &Value, actual: &Value) -> bool {
        self.normalize(desired, None) == self.normalize(actual, None)
    }

    fn normalize(&self, value: &Value, key: Option<&str>) -> Option<Value> {
        match value {
            Value::Null => None,
            Value::Object(map) => {
                let quantities = matches!(key, Some("limits" | "requests"));
                let normalized: Map<String, Value> = map
                    .iter()
                    .filter_map(|(k, v)| {
                        let v = if quantities {
                            canonical_quantity(v)
                        } else {
                            self.normalize(v, Some(k))
                        };
                        v.map(|v| (k.clone(), v))
                    })
                    .collect();
                (!normalized.is_empty()).then_some(Value::Object(normalized))
            }
            Value::Array(items) => {
                let normalized: Vec<Value> = items
                    .iter()
                    .filter(|item| key != Some("env") || !self.is_ignored_env(item))
                    .filter_map(|item| self.normalize(item, None))
                    .collect();
                (!normalized.is_empty()).then_some(Value::Array(normalized))
            }
            Value::String(s) if s.is_empty() => None,
            other => Some(other.clone()),
        }
    }

    fn is_ignored_env(&self, item: &Value) -> bool {
        item.get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| self.ignored_env.contains(name))
    }
}

fn canonical_quantity(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(
            parse_quantity(s).map_or_else(|| value.clone(), |n| Value::String(format!("{n}n"))),
        ),
        Value::Number(n) => Some(
            parse_quantity(&n.to_string())
                .map_or_else(|| value.clone(), |n| Value::String(format!("{n}n"))),
        ),
        other => Some(other.clone()),
    }
}

const NANO: i128 = 1_000_000_000;

/// Parses a Kubernetes resource quantity into nano units.
///
/// Fractions below one nano unit are truncated.
pub fn parse_quantity(quantity: &str) -> Option<i128> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let (negative, number) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (integer, fraction) = number.split_once('.').unwrap_or((number, ""));
    if integer.is_empty() && fraction.is_empty() {
        return None;
    }
    if !integer.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let fraction = &fraction[..fraction.len().min(18)];
    let digits: i128 = format!("{integer}{fraction}").parse().ok()?;
    let scale = i32::try_from(fraction.len()).ok()?;

    let (multiplier, exponent) = suffix_multiplier(suffix)?;
    let exponent = exponent - scale;
    let magnitude = digits.checked_mul(multiplier)?;
    let magnitude = if exponent >= 0 {
        magnitude.checked_mul(10_i128.checked_pow(exponent.unsigned_abs())?)?
    } else {
        magnitude / 10_i128.checked_pow(exponent.unsigned_abs())?
    };

    Some(if negative { -magnitude } else { magnitude })
}

/// Returns the binary multiplier and decimal exponent, in nano units, of a suffix.
fn suffix_multiplier(suffix: &str) -> Option<(i128, i32)> {
    let binary = |power: u32| 1024_i128.checked_pow(power).map(|m| (m, 9));
    match suffix {
        "n" => Some((1, 0)),
        "u" => Some((1, 3)),
        "m" => Some((1, 6)),
        "" => Some((1, 9)),
        "k" => Some((1, 12)),
        "M" => Some((1, 15)),
        "G" => Some((1, 18)),
        "T" => Some((1, 21)),
        "P" => Some((1, 24)),
        "E" => Some((1, 27)),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        _ => {
            let exponent: i32 = suffix.strip_prefix(['e', 'E'])?.parse().ok()?;
            (-9..=27).contains(&exponent).then_some((1, exponent + 9))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("1", Some(NANO))]
    #[case("500m", Some(NANO / 2))]
    #[case("0.5", Some(NANO / 2))]
    #[case("1Ki", Some(1024 * NANO))]
    #[case("1Gi", Some(1024 * 1024 * 1024 * NANO))]
    #[case("1k", Some(1000 * NANO))]
    #[case("1e3", Some(1000 * NANO))]
    #[case("1E", Some(1_000_000_000_000_000_000 * NANO))]
    #[case("-2", Some(-2 * NANO))]
    #[case("abc", None)]
    #[case("1Xi", None)]
    #[case("", None)]
    fn test_parse_quantity(#[case] quantity: &str, #[case] expected: Option<i128>) {
        assert_eq!(parse_quantity(quantity), expected);
    }

    #[test]
    fn test_nulls_and_empty_collections_are_missing() {
        let comparator = Comparator::new();
        assert!(comparator.equivalent(
            &json!({"replicas": 1, "network": null, "labels": {}, "ports": []}),
            &json!({"replicas": 1})
        ));
    }

    #[test]
    fn test_ignored_env_vars_do_not_count_as_drift() {
        let comparator = Comparator::new().ignore_env(&["PORTICO_PUBLISH_SERVICE"]);
        let desired = json!({"containers": [{"name": "controller", "env": [{"name": "LOG_LEVEL", "value": "info"}]}]});
        let actual = json!({"containers": [{"name": "controller", "env": [
            {"name": "LOG_LEVEL", "value": "info"},
            {"name": "PORTICO_PUBLISH_SERVICE", "value": "infra/edge-ingress"}
        ]}]});

        assert!(comparator.equivalent(&desired, &actual));
    }

    #[test]
    fn test_other_env_vars_count_as_drift() {
        let comparator = Comparator::new().ignore_env(&["PORTICO_PUBLISH_SERVICE"]);
        let desired = json!({"env": [{"name": "LOG_LEVEL", "value": "info"}]});
        let actual = json!({"env": [{"name": "LOG_LEVEL", "value": "debug"}]});

        assert!(!comparator.equivalent(&desired, &actual));
    }

    #[test]
    fn test_resource_quantities_compare_by_value() {
        let comparator = Comparator::new();
        assert!(comparator.equivalent(
            &json!({"resources": {"limits": {"cpu": "1", "memory": "1Gi"}}}),
            &json!({"resources": {"limits": {"cpu": "1000m", "memory": "1024Mi"}}})
        ));
        assert!(!comparator.equivalent(
            &json!({"resources": {"requests": {"cpu": "500m"}}}),
            &json!({"resources": {"requests": {"cpu": "1"}}})
        ));
    }

    proptest! {
        #[test]
        fn test_binary_suffixes_scale_by_1024(n in 0i64..1_000_000) {
            prop_assert_eq!(parse_quantity(&format!("{n}Ki")), parse_quantity(&format!("{}", i128::from(n) * 1024)));
            prop_assert_eq!(parse_quantity(&format!("{n}Mi")), parse_quantity(&format!("{}Ki", i128::from(n) * 1024)));
        }

        #[test]
        fn test_milli_units_match_whole_units(n in 0i64..1_000_000) {
            prop_assert_eq!(parse_quantity(&format!("{}m", i128::from(n) * 1000)), parse_quantity(&n.to_string()));
        }

        #[test]
        fn test_comparator_is_reflexive(cpu in 1u32..64, memory in 1u32..4096) {
            let spec = json!({"resources": {"limits": {"cpu": cpu.to_string(), "memory": format!("{memory}Mi")}}});
            prop_assert!(Comparator::new().equivalent(&spec, &spec));
        }
    }
}
