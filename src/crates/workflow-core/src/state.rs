//! Run state: a string-keyed map of JSON values

use serde_json::{Map, Value};

/// The mutable payload threaded through a run
pub type State = Map<String, Value>;

/// Shallow merge: every key in `update` is assigned into `state`,
/// overwriting any existing value. Nested maps are replaced, not merged.
pub fn merge(state: &mut State, update: State) {
    for (key, value) in update {
        state.insert(key, value);
    }
}

/// Truthiness used when a predicate yields a non-boolean value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Build a state from a JSON object, or an empty state for anything else
pub fn from_value(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        _ => State::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_and_adds() {
        let mut state = from_value(json!({"x": 3, "keep": true}));
        merge(&mut state, from_value(json!({"x": 6, "y": "new"})));

        assert_eq!(Value::Object(state), json!({"x": 6, "keep": true, "y": "new"}));
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut state = from_value(json!({"nested": {"a": 1, "b": 2}}));
        merge(&mut state, from_value(json!({"nested": {"c": 3}})));

        assert_eq!(state["nested"], json!({"c": 3}));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([0])));
    }

    #[test]
    fn test_from_value_non_object() {
        assert!(from_value(json!([1, 2])).is_empty());
    }
}
