//! Update documents built from field operators: `$set`, `$unset`, `$inc`,
//! `$mul`, `$addToSet` and `$push`.

use serde_json::Value;

use crate::app_response::{AppResponse, Result};
use crate::document::{get_path, remove_path, set_path, values_equal, Document, Numeric, ID_FIELD};

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Value),
    Unset(String),
    Inc(String, Numeric),
    Mul(String, Numeric),
    AddToSet(String, Vec<Value>),
    Push(String, Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    /// Parses an operator update such as `{"$inc": {"stock": -1}}`.
    /// Replacement documents and changes to `_id` are rejected.
    pub fn parse(value: &Value) -> Result<UpdateSpec> {
        let map = value
            .as_object()
            .filter(|map| !map.is_empty())
            .ok_or_else(|| AppResponse::invalid("update must be a non-empty object"))?;

        let mut ops = Vec::new();
        for (operator, fields) in map {
            if !operator.starts_with('$') {
                return Err(AppResponse::invalid(format!(
                    "update document requires atomic operators, found field '{}'",
                    operator
                )));
            }
            let fields = fields.as_object().ok_or_else(|| {
                AppResponse::invalid(format!("modifier {} expects an object", operator))
            })?;

            for (path, arg) in fields {
                if path == ID_FIELD || path.starts_with("_id.") {
                    return Err(AppResponse::invalid(format!(
                        "performing an update on the path '{}' would modify the immutable field '_id'",
                        path
                    )));
                }
                let path = path.clone();
                let op = match operator.as_str() {
                    "$set" => UpdateOp::Set(path, arg.clone()),
                    "$unset" => UpdateOp::Unset(path),
                    "$inc" => UpdateOp::Inc(path, numeric_modifier(operator, arg)?),
                    "$mul" => UpdateOp::Mul(path, numeric_modifier(operator, arg)?),
                    "$addToSet" => UpdateOp::AddToSet(path, each_values(arg)),
                    "$push" => UpdateOp::Push(path, each_values(arg)),
                    other => {
                        return Err(AppResponse::invalid(format!(
                            "unknown modifier: {}",
                            other
                        )))
                    }
                };
                ops.push(op);
            }
        }
        Ok(UpdateSpec { ops })
    }

    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => set_path(doc, path, value.clone())?,
                UpdateOp::Unset(path) => {
                    remove_path(doc, path);
                }
                UpdateOp::Inc(path, delta) => {
                    let updated = match get_path(doc, path) {
                        None => *delta,
                        Some(current) => current_number("$inc", path, current)?.add(*delta),
                    };
                    set_path(doc, path, updated.into_value())?;
                }
                UpdateOp::Mul(path, factor) => {
                    let updated = match get_path(doc, path) {
                        None => match factor {
                            Numeric::Int(_) => Numeric::Int(0),
                            Numeric::Float(_) => Numeric::Float(0.0),
                        },
                        Some(current) => current_number("$mul", path, current)?.mul(*factor),
                    };
                    set_path(doc, path, updated.into_value())?;
                }
                UpdateOp::AddToSet(path, values) => {
                    let items = array_at(doc, path, "$addToSet")?;
                    for value in values {
                        if !items.iter().any(|existing| values_equal(existing, value)) {
                            items.push(value.clone());
                        }
                    }
                }
                UpdateOp::Push(path, values) => {
                    array_at(doc, path, "$push")?.extend(values.iter().cloned());
                }
            }
        }
        Ok(())
    }
}

fn numeric_modifier(operator: &str, arg: &Value) -> Result<Numeric> {
    Numeric::from_value(arg).ok_or_else(|| {
        AppResponse::invalid(format!("cannot {} with non-numeric argument {}", operator, arg))
    })
}

fn current_number(operator: &str, path: &str, current: &Value) -> Result<Numeric> {
    Numeric::from_value(current).ok_or_else(|| {
        AppResponse::invalid(format!(
            "cannot apply {} to a value of non-numeric type at '{}': {}",
            operator, path, current
        ))
    })
}

/// `{"$each": [a, b]}` adds every element; anything else adds itself.
fn each_values(arg: &Value) -> Vec<Value> {
    match arg.get("$each").and_then(Value::as_array) {
        Some(items) if arg.as_object().map(|m| m.len() == 1).unwrap_or(false) => items.clone(),
        _ => vec![arg.clone()],
    }
}

/// The array stored at `path`, created empty when the field is missing.
fn array_at<'a>(doc: &'a mut Document, path: &str, operator: &str) -> Result<&'a mut Vec<Value>> {
    if get_path(doc, path).is_none() {
        set_path(doc, path, Value::Array(Vec::new()))?;
    }

    let mut segments = path.split('.');
    let first = segments.next().unwrap_or(path);
    let mut current = doc.get_mut(first);
    for segment in segments {
        current = match current {
            Some(Value::Object(map)) => map.get_mut(segment),
            Some(Value::Array(items)) => match segment.parse::<usize>() {
                Ok(index) => items.get_mut(index),
                Err(_) => None,
            },
            _ => None,
        };
    }

    match current {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(AppResponse::invalid(format!(
            "cannot apply {} to non-array field '{}': {}",
            operator, path, other
        ))),
        None => Err(AppResponse::invalid(format!(
            "cannot apply {} to '{}'",
            operator, path
        ))),
    }
}
