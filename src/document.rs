//! Dot-path access, value ordering and numeric helpers shared by the
//! filter, expression, update and pipeline evaluators.
//!
//! Documents are plain `serde_json::Value` objects. Paths follow the usual
//! document-database convention: `address.city` walks into embedded objects,
//! and a path that crosses an array (`items.product_id`) fans out over every
//! element of that array.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::app_response::{AppResponse, Result};

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// Collects every value reachable through `path`, descending into arrays of
/// embedded documents. Numeric segments index into arrays.
pub fn path_values<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![value];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for candidate in current {
            match candidate {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    if let Ok(index) = segment.parse::<usize>() {
                        if let Some(child) = items.get(index) {
                            next.push(child);
                        }
                    } else {
                        for item in items {
                            if let Value::Object(map) = item {
                                if let Some(child) = map.get(segment) {
                                    next.push(child);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}

/// Resolves a path the way aggregation field paths do: missing yields
/// `None`, and crossing an array yields an array of the resolved values.
pub fn resolve_path(value: &Value, path: &str) -> Option<Value> {
    let mut segments = path.splitn(2, '.');
    let head = segments.next()?;
    let rest = segments.next();
    match value {
        Value::Object(map) => {
            let child = map.get(head)?;
            match rest {
                Some(rest) => resolve_path(child, rest),
                None => Some(child.clone()),
            }
        }
        Value::Array(items) => {
            let resolved: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(_) => resolve_path(item, path),
                    _ => None,
                })
                .collect();
            Some(Value::Array(resolved))
        }
        _ => None,
    }
}

/// Writes `value` at `path`, creating intermediate objects as needed.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<()> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments
        .pop()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppResponse::invalid(format!("empty field path '{}'", path)))?;

    let mut current = doc;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            other => {
                return Err(AppResponse::invalid(format!(
                    "cannot create field '{}' inside non-object value {}",
                    path, other
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Reads the single value stored at `path` without fanning out over arrays.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => doc.shift_remove(path),
        Some((parent, leaf)) => {
            let mut current = doc;
            for segment in parent.split('.') {
                current = match current.get_mut(segment) {
                    Some(Value::Object(map)) => map,
                    _ => return None,
                };
            }
            current.shift_remove(leaf)
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order across JSON types: null < numbers < strings < objects <
/// arrays < booleans. Used by sorting, `$min`/`$max` and `$expr`
/// comparisons.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Comparison for query range operators, which only compare values of the
/// same kind. `None` means the operator does not apply.
pub fn compare_same_kind(a: &Value, b: &Value) -> Option<Ordering> {
    if type_rank(a) == type_rank(b) {
        Some(compare_values(a, b))
    } else {
        None
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    match (x.as_i64(), y.as_i64()) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => {
            let a = x.as_f64().unwrap_or(f64::NAN);
            let b = y.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

/// Equality with numeric normalisation, so `100` matches `100.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && values_equal(lv, rv))
        }
        _ => a == b,
    }
}

/// A number that remembers whether it started life as an integer, so
/// arithmetic on integer fields stays integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn from_value(value: &Value) -> Option<Numeric> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Numeric::Int(i)),
                None => n.as_f64().map(Numeric::Float),
            },
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    pub fn add(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a
                .checked_add(b)
                .map(Numeric::Int)
                .unwrap_or(Numeric::Float(a as f64 + b as f64)),
            (a, b) => Numeric::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn sub(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a
                .checked_sub(b)
                .map(Numeric::Int)
                .unwrap_or(Numeric::Float(a as f64 - b as f64)),
            (a, b) => Numeric::Float(a.as_f64() - b.as_f64()),
        }
    }

    pub fn mul(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a
                .checked_mul(b)
                .map(Numeric::Int)
                .unwrap_or(Numeric::Float(a as f64 * b as f64)),
            (a, b) => Numeric::Float(a.as_f64() * b.as_f64()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Numeric::Int(i) => Value::from(i),
            Numeric::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

pub fn float_value(f: f64) -> Value {
    Numeric::Float(f).into_value()
}

/// Human-readable rendering of an `_id` for log lines and error messages.
pub fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_values_fans_out_over_arrays() {
        let order = json!({"items": [{"product_id": 1}, {"product_id": 4}]});
        let found: Vec<&Value> = path_values(&order, "items.product_id");
        assert_eq!(found, vec![&json!(1), &json!(4)]);
        assert!(path_values(&order, "items.quantity").is_empty());
    }

    #[test]
    fn resolve_path_distinguishes_missing_from_null() {
        let emp = json!({"manager_id": null, "dept": {"name": "IT"}});
        assert_eq!(resolve_path(&emp, "manager_id"), Some(Value::Null));
        assert_eq!(resolve_path(&emp, "commission_pct"), None);
        assert_eq!(resolve_path(&emp, "dept.name"), Some(json!("IT")));
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut doc = Document::new();
        set_path(&mut doc, "address.city", json!("Seattle")).unwrap();
        assert_eq!(get_path(&doc, "address.city"), Some(&json!("Seattle")));
        assert_eq!(remove_path(&mut doc, "address.city"), Some(json!("Seattle")));
        assert_eq!(doc.get("address"), Some(&json!({})));
    }

    #[test]
    fn ordering_spans_types() {
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10.5)), Ordering::Less);
        assert_eq!(compare_values(&json!("2005"), &json!("2004")), Ordering::Greater);
        assert_eq!(compare_same_kind(&json!("a"), &json!(1)), None);
        assert!(values_equal(&json!(100), &json!(100.0)));
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let sum = Numeric::Int(450).add(Numeric::Int(50));
        assert_eq!(sum.into_value(), json!(500));
        let raised = Numeric::Int(4800).mul(Numeric::Float(1.5));
        assert_eq!(raised.into_value(), json!(7200.0));
    }
}
