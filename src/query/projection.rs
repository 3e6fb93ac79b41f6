//! Projections shared by `find` and the `$project` stage.

use serde_json::{Map, Value};

use crate::app_response::{AppResponse, Result};
use crate::document::{float_value, remove_path, set_path, Document, ID_FIELD};
use crate::query::expression::Expression;

#[derive(Debug, Clone, PartialEq)]
enum Field {
    Include,
    Exclude,
    Computed(Expression),
    TextScore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<(String, Field)>,
    inclusive: bool,
}

impl Projection {
    pub fn parse(value: &Value) -> Result<Projection> {
        let map = value
            .as_object()
            .ok_or_else(|| AppResponse::invalid("projection must be an object"))?;

        let mut fields = Vec::with_capacity(map.len());
        let mut includes = false;
        let mut excludes = false;
        for (path, spec) in map {
            let field = parse_field(spec)?;
            match (&field, path.as_str()) {
                (Field::Exclude, ID_FIELD) | (Field::Include, ID_FIELD) => {}
                (Field::Exclude, _) => excludes = true,
                (Field::Include | Field::Computed(_), _) => includes = true,
                (Field::TextScore, _) => {}
            }
            fields.push((path.clone(), field));
        }

        if includes && excludes {
            return Err(AppResponse::invalid(
                "cannot mix inclusion and exclusion in one projection",
            ));
        }

        // `{_id: 1}` alone is an inclusion projection too.
        let inclusive = includes
            || (!excludes
                && fields
                    .iter()
                    .any(|(path, f)| path == ID_FIELD && *f == Field::Include));

        Ok(Projection { fields, inclusive })
    }

    /// Whether a field projects `{$meta: "textScore"}`.
    pub fn uses_text_score(&self) -> bool {
        self.fields.iter().any(|(_, field)| *field == Field::TextScore)
    }

    fn excludes_id(&self) -> bool {
        self.fields
            .iter()
            .any(|(path, f)| path == ID_FIELD && *f == Field::Exclude)
    }

    /// Shapes `doc`; `score` is the text relevance for `{$meta: "textScore"}`.
    pub fn apply(&self, doc: &Value, score: Option<f64>) -> Result<Value> {
        let source = doc
            .as_object()
            .ok_or_else(|| AppResponse::invalid("can only project documents"))?;

        let mut out = if self.inclusive {
            let mut out = Document::new();
            if !self.excludes_id() {
                if let Some(id) = source.get(ID_FIELD) {
                    out.insert(ID_FIELD.to_string(), id.clone());
                }
            }
            out
        } else {
            source.clone()
        };

        for (path, field) in &self.fields {
            match field {
                Field::Include if path != ID_FIELD => {
                    let segments: Vec<&str> = path.split('.').collect();
                    if let Some(picked) = pick(doc, &segments) {
                        merge_into(&mut out, &segments[0..1], picked);
                    }
                }
                Field::Include => {}
                Field::Exclude => {
                    remove_path(&mut out, path);
                }
                Field::Computed(expr) => {
                    if let Some(value) = expr.evaluate(doc)? {
                        set_path(&mut out, path, value)?;
                    }
                }
                Field::TextScore => {
                    if let Some(score) = score {
                        set_path(&mut out, path, float_value(score))?;
                    }
                }
            }
        }
        Ok(Value::Object(out))
    }
}

fn parse_field(spec: &Value) -> Result<Field> {
    match spec {
        Value::Bool(true) => Ok(Field::Include),
        Value::Bool(false) => Ok(Field::Exclude),
        Value::Number(n) => Ok(if n.as_f64() == Some(0.0) { Field::Exclude } else { Field::Include }),
        Value::Object(map) if map.contains_key("$meta") => match map.get("$meta") {
            Some(Value::String(kind)) if kind == "textScore" && map.len() == 1 => Ok(Field::TextScore),
            _ => Err(AppResponse::invalid(format!("unsupported $meta projection: {}", spec))),
        },
        other => Ok(Field::Computed(Expression::parse(other)?)),
    }
}

/// The sub-document of `value` that an inclusion of `segments` keeps,
/// wrapped back up to the first segment. Arrays of embedded documents are
/// projected element-wise.
fn pick(value: &Value, segments: &[&str]) -> Option<Value> {
    let (head, rest) = segments.split_first()?;
    match value {
        Value::Object(map) => {
            let child = map.get(*head)?;
            let inner = if rest.is_empty() { child.clone() } else { pick(child, rest)? };
            let mut wrapped = Map::new();
            wrapped.insert(head.to_string(), inner);
            Some(Value::Object(wrapped))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter(|item| item.is_object())
                .filter_map(|item| pick(item, segments))
                .collect(),
        )),
        _ => None,
    }
}

/// Merges a picked `{head: ...}` fragment into `out`, combining sibling
/// paths such as `address.city` and `address.state`.
fn merge_into(out: &mut Document, head: &[&str], picked: Value) {
    let Value::Object(fragment) = picked else {
        return;
    };
    let Some(key) = head.first() else {
        return;
    };
    let Some(incoming) = fragment.get(*key).cloned() else {
        return;
    };
    match out.get_mut(*key) {
        Some(existing) => merge_values(existing, incoming),
        None => {
            out.insert(key.to_string(), incoming);
        }
    }
}

fn merge_values(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, value) in right {
                match left.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        left.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for (slot, value) in left.iter_mut().zip(right) {
                merge_values(slot, value);
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(spec: Value, doc: Value) -> Value {
        Projection::parse(&spec).unwrap().apply(&doc, None).unwrap()
    }

    #[test]
    fn inclusion_keeps_id_unless_suppressed() {
        let emp = json!({"_id": 100, "first_name": "Steven", "last_name": "King", "salary": 24000});
        assert_eq!(
            project(json!({"first_name": 1, "last_name": 1}), emp.clone()),
            json!({"_id": 100, "first_name": "Steven", "last_name": "King"})
        );
        assert_eq!(
            project(json!({"first_name": 1, "_id": 0}), emp),
            json!({"first_name": "Steven"})
        );
    }

    #[test]
    fn exclusion_drops_fields() {
        let product = json!({"_id": 1, "name": "Laptop", "specifications": {"cpu": "i7"}});
        assert_eq!(
            project(json!({"specifications": 0}), product),
            json!({"_id": 1, "name": "Laptop"})
        );
    }

    #[test]
    fn dotted_inclusion_merges_siblings() {
        let customer = json!({"_id": 1, "address": {"city": "NYC", "state": "NY", "zip": "10001"}});
        assert_eq!(
            project(json!({"address.city": 1, "address.state": 1, "_id": 0}), customer),
            json!({"address": {"city": "NYC", "state": "NY"}})
        );
    }

    #[test]
    fn dotted_inclusion_through_arrays() {
        let order = json!({"_id": 2001, "items": [{"product_id": 1, "quantity": 1}, {"product_id": 2, "quantity": 2}]});
        assert_eq!(
            project(json!({"items.product_id": 1}), order),
            json!({"_id": 2001, "items": [{"product_id": 1}, {"product_id": 2}]})
        );
    }

    #[test]
    fn computed_fields_and_text_score() {
        let spec = json!({"name": 1, "score": {"$meta": "textScore"}, "tag_count": {"$size": "$tags"}});
        let projection = Projection::parse(&spec).unwrap();
        let out = projection
            .apply(&json!({"_id": 4, "name": "Keyboard", "tags": ["a", "b"]}), Some(1.5))
            .unwrap();
        assert_eq!(out, json!({"_id": 4, "name": "Keyboard", "score": 1.5, "tag_count": 2}));
        assert!(projection.uses_text_score());
        assert!(!Projection::parse(&json!({"name": 1})).unwrap().uses_text_score());
    }

    #[test]
    fn mixing_modes_is_rejected() {
        assert!(Projection::parse(&json!({"name": 1, "price": 0})).is_err());
        assert!(Projection::parse(&json!({"name": 1, "_id": 0})).is_ok());
    }
}
