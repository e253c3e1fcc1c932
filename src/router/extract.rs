//! Field extraction from JSON message bodies
//!
//! Source paths are dot-separated object keys; a numeric segment indexes into
//! an array (`readings.0.value`).

use serde_json::Value;

/// Find the value at `path`, if present
pub fn lookup<'v>(body: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(body, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Read a metric value: numbers, numeric strings and booleans (1 or 0)
///
/// Only finite values are accepted; `"NaN"` and `"inf"` strings are absent.
pub fn as_metric(value: &Value) -> Option<f64> {
    let value = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;

    value.is_finite().then_some(value)
}

/// Read a metadata value: strings verbatim, numbers and booleans as text
pub fn as_metadata(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_lookup_nested_paths() {
        let body = json!({
            "env": { "temperature": 21.5 },
            "readings": [{ "value": 1 }, { "value": 2 }],
        });

        assert_eq!(lookup(&body, "env.temperature"), Some(&json!(21.5)));
        assert_eq!(lookup(&body, "readings.1.value"), Some(&json!(2)));
        assert_eq!(lookup(&body, "env.missing"), None);
        assert_eq!(lookup(&body, "readings.5.value"), None);
        assert_eq!(lookup(&body, "env.temperature.deeper"), None);
    }

    #[test]
    fn test_metric_coercion() {
        assert_eq!(as_metric(&json!(3)), Some(3.0));
        assert_eq!(as_metric(&json!(-1.25)), Some(-1.25));
        assert_eq!(as_metric(&json!(" 4.5 ")), Some(4.5));
        assert_eq!(as_metric(&json!(true)), Some(1.0));
        assert_eq!(as_metric(&json!(false)), Some(0.0));
        assert_eq!(as_metric(&json!("warm")), None);
        assert_eq!(as_metric(&json!(null)), None);
        assert_eq!(as_metric(&json!({ "a": 1 })), None);
    }

    #[test]
    fn test_metric_rejects_non_finite_strings() {
        assert_eq!(as_metric(&json!("NaN")), None);
        assert_eq!(as_metric(&json!("inf")), None);
        assert_eq!(as_metric(&json!("-inf")), None);
        assert_eq!(as_metric(&json!("1e400")), None);
    }

    #[test]
    fn test_metadata_coercion() {
        assert_eq!(as_metadata(&json!("porch")), Some("porch".to_string()));
        assert_eq!(as_metadata(&json!(12)), Some("12".to_string()));
        assert_eq!(as_metadata(&json!(true)), Some("true".to_string()));
        assert_eq!(as_metadata(&json!(null)), None);
        assert_eq!(as_metadata(&json!([1, 2])), None);
    }
}
