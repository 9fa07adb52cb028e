//! Layer merging for JSON5 config values.

use serde_json::{Map, Value};

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else
/// is replaced by the overlay value.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut *base, overlay) else {
        *base = overlay.clone();
        return;
    };
    for (key, value) in overlay_map {
        if let Some(existing) = base_map.get_mut(key) {
            merge_json_values(existing, value);
        } else {
            base_map.insert(key.clone(), value.clone());
        }
    }
}

/// Deep-merge `overlay` into `base`, leaving keys locked by `constraints`
/// untouched.
///
/// A scalar or array in the constraints locks that key; an object in the
/// constraints only locks the keys it names.
pub(super) fn merge_json_with_constraints(
    base: &mut Value,
    overlay: &Value,
    constraints: Option<&Value>,
) {
    let constraint_map = match constraints {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return,
    };
    let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut *base, overlay) else {
        if constraint_map.is_none() {
            merge_json_values(base, overlay);
        }
        return;
    };
    for (key, value) in overlay_map {
        merge_key(base_map, key, value, constraint_map.and_then(|map| map.get(key)));
    }
}

fn merge_key(base_map: &mut Map<String, Value>, key: &str, value: &Value, locked: Option<&Value>) {
    match locked {
        None => match base_map.get_mut(key) {
            Some(existing) => merge_json_values(existing, value),
            None => {
                base_map.insert(key.to_string(), value.clone());
            }
        },
        Some(nested @ Value::Object(_)) => {
            let entry = base_map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            merge_json_with_constraints(entry, value, Some(nested));
        }
        Some(_) => {}
    }
}
