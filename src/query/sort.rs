use std::cmp::Ordering;

use serde_json::Value;

use crate::app_response::{AppResponse, Result};
use crate::document::{compare_values, resolve_path};

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Field { path: String, descending: bool },
    /// `{$meta: "textScore"}`, always highest first.
    TextScore,
}

/// A compound sort such as `{"department_id": 1, "salary": -1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn parse(value: &Value) -> Result<SortSpec> {
        let map = value
            .as_object()
            .filter(|map| !map.is_empty())
            .ok_or_else(|| AppResponse::invalid("sort must be a non-empty object"))?;

        let keys = map
            .iter()
            .map(|(path, direction)| match direction {
                Value::Number(n) if n.as_f64() == Some(1.0) => Ok(SortKey::Field {
                    path: path.clone(),
                    descending: false,
                }),
                Value::Number(n) if n.as_f64() == Some(-1.0) => Ok(SortKey::Field {
                    path: path.clone(),
                    descending: true,
                }),
                Value::Object(meta) if meta.get("$meta") == Some(&Value::from("textScore")) => {
                    Ok(SortKey::TextScore)
                }
                other => Err(AppResponse::invalid(format!(
                    "invalid sort direction for '{}': {}",
                    path, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SortSpec { keys })
    }

    pub fn uses_text_score(&self) -> bool {
        self.keys.contains(&SortKey::TextScore)
    }

    /// Missing fields sort as `null`, i.e. before everything else.
    pub fn compare(&self, a: &Value, b: &Value, score_a: Option<f64>, score_b: Option<f64>) -> Ordering {
        for key in &self.keys {
            let ord = match key {
                SortKey::Field { path, descending } => {
                    let left = sort_value(resolve_path(a, path), *descending);
                    let right = sort_value(resolve_path(b, path), *descending);
                    let ord = compare_values(&left, &right);
                    if *descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
                SortKey::TextScore => score_b
                    .unwrap_or(0.0)
                    .partial_cmp(&score_a.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of plain documents.
    pub fn sort(&self, docs: &mut [Value]) {
        docs.sort_by(|a, b| self.compare(a, b, None, None));
    }

    /// Stable sort of documents paired with their text scores.
    pub fn sort_scored(&self, docs: &mut [(Value, Option<f64>)]) {
        docs.sort_by(|(a, sa), (b, sb)| self.compare(a, b, *sa, *sb));
    }
}

/// The value a document sorts by. Arrays sort by their smallest element
/// ascending and their largest descending; an empty array sorts as `null`.
fn sort_value(value: Option<Value>, descending: bool) -> Value {
    match value {
        Some(Value::Array(items)) => {
            let pick = if descending {
                items.into_iter().max_by(compare_values)
            } else {
                items.into_iter().min_by(compare_values)
            };
            pick.unwrap_or(Value::Null)
        }
        Some(value) => value,
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compound_keys_and_stability() {
        let spec = SortSpec::parse(&json!({"department_id": 1, "salary": -1})).unwrap();
        let mut docs = vec![
            json!({"_id": 1, "department_id": 60, "salary": 4800}),
            json!({"_id": 2, "department_id": 50, "salary": 5800}),
            json!({"_id": 3, "department_id": 60, "salary": 9000}),
            json!({"_id": 4, "department_id": 60, "salary": 4800}),
        ];
        spec.sort(&mut docs);
        let ids: Vec<i64> = docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
    }

    #[test]
    fn missing_sorts_first_ascending() {
        let spec = SortSpec::parse(&json!({"commission_pct": 1})).unwrap();
        let mut docs = vec![json!({"commission_pct": 0.2}), json!({})];
        spec.sort(&mut docs);
        assert_eq!(docs[0], json!({}));
    }

    #[test]
    fn text_score_sorts_descending() {
        let spec = SortSpec::parse(&json!({"score": {"$meta": "textScore"}})).unwrap();
        assert!(spec.uses_text_score());
        let mut docs = vec![(json!({"_id": 1}), Some(0.75)), (json!({"_id": 2}), Some(1.5))];
        spec.sort_scored(&mut docs);
        assert_eq!(docs[0].0["_id"], 2);
    }

    #[test]
    fn arrays_sort_by_their_extreme_element() {
        fn ids(docs: &[Value]) -> Vec<i64> {
            docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect()
        }

        // Smallest element ascending: 0 before 1.
        let mut docs = vec![json!({"_id": 1, "sizes": [1]}), json!({"_id": 2, "sizes": [2, 0]})];
        SortSpec::parse(&json!({"sizes": 1})).unwrap().sort(&mut docs);
        assert_eq!(ids(&docs), vec![2, 1]);

        // Largest element descending: 10 before 5.
        let mut docs = vec![json!({"_id": 1, "sizes": [5]}), json!({"_id": 2, "sizes": [1, 10]})];
        SortSpec::parse(&json!({"sizes": -1})).unwrap().sort(&mut docs);
        assert_eq!(ids(&docs), vec![2, 1]);
    }

    #[test]
    fn bad_direction_is_rejected() {
        assert!(SortSpec::parse(&json!({"price": 2})).is_err());
        assert!(SortSpec::parse(&json!({})).is_err());
    }
}
