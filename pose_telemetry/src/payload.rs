//! Payload encoding with bounded float precision.

use serde::Serialize;
use serde_json::{Number, Value};

use crate::Result;

/// Truncate (toward zero) to `digits` fractional digits.
///
/// Works on the decimal text so `0.29` stays `0.29` instead of becoming
/// `0.28` through binary rounding.  Values that are exactly representable
/// as `f32` are printed with `f32`'s shortest form first, since most of
/// our numbers start life as `f32`.
pub fn truncate(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let narrow = value as f32;
    let text = if f64::from(narrow) == value { narrow.to_string() } else { value.to_string() };

    let Some(dot) = text.find('.') else { return value };
    let end = if digits == 0 { dot } else { (dot + 1 + digits as usize).min(text.len()) };
    text[..end].parse().unwrap_or(value)
}

/// Truncate every float inside a JSON tree in place.  Integers are left
/// untouched.
pub fn truncate_value(value: &mut Value, digits: u32) {
    match value {
        Value::Number(n) if n.is_f64() => {
            if let Some(t) = n.as_f64().and_then(|f| Number::from_f64(truncate(f, digits))) {
                *n = t;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| truncate_value(v, digits)),
        Value::Object(map) => map.values_mut().for_each(|v| truncate_value(v, digits)),
        _ => {}
    }
}

/// JavaScript-style falsiness: `null`, `false`, `0` and `""`.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Serialize `data` to a truncated JSON value, or `None` if it is falsy.
pub fn to_payload<T: Serialize + ?Sized>(data: &T, digits: u32) -> Result<Option<Value>> {
    let mut value = serde_json::to_value(data)?;
    if is_falsy(&value) {
        return Ok(None);
    }
    truncate_value(&mut value, digits);
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncates_not_rounds() {
        assert_eq!(truncate(1.234567, 2), 1.23);
        assert_eq!(truncate(1.239, 2), 1.23);
        assert_eq!(truncate(-1.239, 2), -1.23);
    }

    #[test]
    fn binary_noise_does_not_leak() {
        assert_eq!(truncate(0.29, 2), 0.29);
        assert_eq!(truncate(f64::from(0.29f32), 2), 0.29);
    }

    #[test]
    fn zero_digits_drops_fraction() {
        assert_eq!(truncate(412.98, 0), 412.0);
    }

    #[test]
    fn short_values_unchanged() {
        assert_eq!(truncate(1.5, 3), 1.5);
        assert_eq!(truncate(7.0, 2), 7.0);
    }

    #[test]
    fn tree_is_truncated() {
        let mut v = json!({"a": 1.234567, "b": [2.71828, {"c": 3}], "d": "x"});
        truncate_value(&mut v, 2);
        assert_eq!(v, json!({"a": 1.23, "b": [2.71, {"c": 3}], "d": "x"}));
        assert_eq!(serde_json::to_string(&v["a"]).unwrap(), "1.23");
    }

    #[test]
    fn falsy_values() {
        assert!(is_falsy(&json!(null)));
        assert!(is_falsy(&json!(false)));
        assert!(is_falsy(&json!(0)));
        assert!(is_falsy(&json!(0.0)));
        assert!(is_falsy(&json!("")));
        assert!(!is_falsy(&json!([])));
        assert!(!is_falsy(&json!({"x": 0})));
    }

    #[test]
    fn none_payload_for_falsy() {
        assert!(to_payload(&Option::<f32>::None, 2).unwrap().is_none());
        assert!(to_payload(&json!({"distance": 1.0}), 2).unwrap().is_some());
    }
}
