//! Query filters: `{"salary": {"$gt": 10000}}`, `{"tags": {"$all": [...]}}`,
//! `{"$expr": ...}`, `{"$text": {"$search": ...}}` and friends.
//!
//! A filter document is parsed once into a [`Filter`] tree and then matched
//! against each candidate document.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::app_response::{AppResponse, Result};
use crate::document::{compare_same_kind, path_values, values_equal};
use crate::query::expression::Expression;
use crate::query::text::TextQuery;

#[derive(Debug, Clone)]
pub enum Filter {
    /// The empty filter `{}`.
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: String, conditions: Vec<Condition> },
    Expr(Expression),
    Text(TextQuery),
}

#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    ElemMatch(Box<Filter>),
    Not(Box<Condition>),
}

impl Filter {
    pub fn parse(value: &Value) -> Result<Filter> {
        let map = value
            .as_object()
            .ok_or_else(|| AppResponse::invalid(format!("filter must be an object, got {}", value)))?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, operand) in map {
            let clause = match key.as_str() {
                "$and" => Filter::And(parse_list(key, operand)?),
                "$or" => Filter::Or(parse_list(key, operand)?),
                "$nor" => Filter::Nor(parse_list(key, operand)?),
                "$expr" => Filter::Expr(Expression::parse(operand)?),
                "$text" => Filter::Text(TextQuery::parse(operand)?),
                op if op.starts_with('$') => {
                    return Err(AppResponse::invalid(format!(
                        "unknown top level operator: {}",
                        op
                    )))
                }
                path => Filter::Field {
                    path: path.to_string(),
                    conditions: parse_conditions(operand)?,
                },
            };
            clauses.push(clause);
        }

        Ok(match clauses.len() {
            0 => Filter::All,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        })
    }

    pub fn matches(&self, doc: &Value) -> Result<bool> {
        match self {
            Filter::All => Ok(true),
            Filter::And(filters) => {
                for filter in filters {
                    if !filter.matches(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(filters) => {
                for filter in filters {
                    if filter.matches(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Nor(filters) => {
                for filter in filters {
                    if filter.matches(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Field { path, conditions } => {
                let values = path_values(doc, path);
                for condition in conditions {
                    if !condition.matches(&values)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Expr(expr) => {
                let result = expr.evaluate(doc)?;
                Ok(match result {
                    None | Some(Value::Null) | Some(Value::Bool(false)) => false,
                    Some(Value::Number(n)) => n.as_f64() != Some(0.0),
                    Some(_) => true,
                })
            }
            Filter::Text(query) => Ok(query.score(doc)?.is_some()),
        }
    }

    /// The `$text` clause, if this filter (or one of its `$and` / `$or`
    /// branches) has one.
    pub fn text_query(&self) -> Option<&TextQuery> {
        match self {
            Filter::Text(query) => Some(query),
            Filter::And(filters) | Filter::Or(filters) => filters.iter().find_map(Filter::text_query),
            _ => None,
        }
    }

    pub fn text_query_mut(&mut self) -> Option<&mut TextQuery> {
        match self {
            Filter::Text(query) => Some(query),
            Filter::And(filters) | Filter::Or(filters) => {
                filters.iter_mut().find_map(Filter::text_query_mut)
            }
            _ => None,
        }
    }

    /// Relevance score for documents matched through a `$text` clause.
    pub fn text_score(&self, doc: &Value) -> Result<Option<f64>> {
        match self.text_query() {
            Some(query) => query.score(doc),
            None => Ok(None),
        }
    }
}

fn parse_list(op: &str, operand: &Value) -> Result<Vec<Filter>> {
    let items = operand
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| AppResponse::invalid(format!("{} must be a non-empty array", op)))?;
    items.iter().map(Filter::parse).collect()
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    map.keys().next().map(|k| k.starts_with('$')).unwrap_or(false)
}

fn parse_conditions(operand: &Value) -> Result<Vec<Condition>> {
    match operand {
        Value::Object(map) if is_operator_object(map) => {
            let mut conditions = Vec::with_capacity(map.len());
            if let Some(pattern) = map.get("$regex") {
                let options = map.get("$options").and_then(Value::as_str).unwrap_or("");
                conditions.push(Condition::Regex(build_regex(pattern, options)?));
            }
            for (op, arg) in map {
                let condition = match op.as_str() {
                    "$regex" | "$options" => continue,
                    "$eq" => Condition::Eq(arg.clone()),
                    "$ne" => Condition::Ne(arg.clone()),
                    "$gt" => Condition::Gt(arg.clone()),
                    "$gte" => Condition::Gte(arg.clone()),
                    "$lt" => Condition::Lt(arg.clone()),
                    "$lte" => Condition::Lte(arg.clone()),
                    "$in" => Condition::In(array_arg(op, arg)?),
                    "$nin" => Condition::Nin(array_arg(op, arg)?),
                    "$all" => Condition::All(array_arg(op, arg)?),
                    "$exists" => Condition::Exists(truthy_flag(arg)),
                    "$size" => Condition::Size(
                        arg.as_u64()
                            .ok_or_else(|| AppResponse::invalid("$size needs a non-negative integer"))?
                            as usize,
                    ),
                    "$elemMatch" => Condition::ElemMatch(Box::new(Filter::parse(arg)?)),
                    "$not" => {
                        let mut inner = parse_conditions(arg)?;
                        if inner.len() != 1 {
                            return Err(AppResponse::invalid("$not needs exactly one operator"));
                        }
                        Condition::Not(Box::new(inner.remove(0)))
                    }
                    other => {
                        return Err(AppResponse::invalid(format!("unknown operator: {}", other)))
                    }
                };
                conditions.push(condition);
            }
            if map.contains_key("$options") && !map.contains_key("$regex") {
                return Err(AppResponse::invalid("$options needs a $regex"));
            }
            Ok(conditions)
        }
        other => Ok(vec![Condition::Eq(other.clone())]),
    }
}

fn build_regex(pattern: &Value, options: &str) -> Result<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| AppResponse::invalid("$regex has to be a string"))?;
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(AppResponse::invalid(format!(
                    "invalid flag in regex options: {}",
                    other
                )))
            }
        };
    }
    Ok(builder.build()?)
}

fn array_arg(op: &str, arg: &Value) -> Result<Vec<Value>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| AppResponse::invalid(format!("{} needs an array", op)))
}

fn truthy_flag(arg: &Value) -> bool {
    match arg {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Null => false,
        _ => true,
    }
}

/// True if `predicate` holds for a value or, when it is an array, for any
/// of its elements.
fn any_element(values: &[&Value], predicate: impl Fn(&Value) -> bool) -> bool {
    values.iter().any(|value| {
        predicate(value)
            || matches!(value, Value::Array(items) if items.iter().any(|item| predicate(item)))
    })
}

/// Equality the way `{"field": value}` matches: against the value itself,
/// against array elements, and `null` also matches a missing field.
fn equality_match(values: &[&Value], target: &Value) -> bool {
    if values.is_empty() {
        return target.is_null();
    }
    any_element(values, |v| values_equal(v, target))
}

fn range_match(values: &[&Value], target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    any_element(values, |v| compare_same_kind(v, target).map(&accept).unwrap_or(false))
}

impl Condition {
    fn matches(&self, values: &[&Value]) -> Result<bool> {
        let matched = match self {
            Condition::Eq(target) => equality_match(values, target),
            Condition::Ne(target) => !equality_match(values, target),
            Condition::Gt(target) => range_match(values, target, |o| o == Ordering::Greater),
            Condition::Gte(target) => range_match(values, target, |o| o != Ordering::Less),
            Condition::Lt(target) => range_match(values, target, |o| o == Ordering::Less),
            Condition::Lte(target) => range_match(values, target, |o| o != Ordering::Greater),
            Condition::In(targets) => targets.iter().any(|t| equality_match(values, t)),
            Condition::Nin(targets) => !targets.iter().any(|t| equality_match(values, t)),
            Condition::All(targets) => {
                !targets.is_empty() && targets.iter().all(|t| equality_match(values, t))
            }
            Condition::Exists(expected) => values.is_empty() != *expected,
            Condition::Regex(re) => {
                any_element(values, |v| v.as_str().map(|s| re.is_match(s)).unwrap_or(false))
            }
            Condition::Size(len) => values
                .iter()
                .any(|v| v.as_array().map(|items| items.len() == *len).unwrap_or(false)),
            Condition::ElemMatch(filter) => {
                for value in values {
                    if let Value::Array(items) = value {
                        for item in items {
                            if filter.matches(item)? {
                                return Ok(true);
                            }
                        }
                    }
                }
                false
            }
            Condition::Not(inner) => !inner.matches(values)?,
        };
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(filter: Value, doc: Value) -> bool {
        Filter::parse(&filter).unwrap().matches(&doc).unwrap()
    }

    #[test]
    fn equality_and_ranges() {
        let emp = json!({"salary": 24000, "hire_date": "2003-06-17", "job_id": "AD_PRES"});
        assert!(check(json!({"salary": {"$gt": 10000}}), emp.clone()));
        assert!(!check(json!({"hire_date": {"$gt": "2005-01-01"}}), emp.clone()));
        assert!(check(json!({"job_id": "AD_PRES", "salary": {"$gte": 24000}}), emp.clone()));
        // Mixed kinds never satisfy a range.
        assert!(!check(json!({"salary": {"$lt": "z"}}), emp));
    }

    #[test]
    fn null_matches_missing_and_ne_null_needs_a_value() {
        let with = json!({"commission_pct": 0.4});
        let null = json!({"commission_pct": null});
        let missing = json!({});
        let has_commission = json!({"commission_pct": {"$ne": null}});
        assert!(check(has_commission.clone(), with));
        assert!(!check(has_commission.clone(), null.clone()));
        assert!(!check(has_commission, missing.clone()));
        assert!(check(json!({"commission_pct": null}), missing));
    }

    #[test]
    fn array_membership() {
        let product = json!({"tags": ["laptop", "computer", "electronics"]});
        assert!(check(json!({"tags": "laptop"}), product.clone()));
        assert!(check(json!({"tags": {"$all": ["laptop", "computer"]}}), product.clone()));
        assert!(!check(json!({"tags": {"$all": ["laptop", "desk"]}}), product.clone()));
        assert!(check(json!({"tags": {"$in": ["wireless", "computer"]}}), product.clone()));
        assert!(!check(json!({"tags": {"$nin": ["laptop"]}}), product.clone()));
        assert!(check(json!({"tags": {"$size": 3}}), product));
    }

    #[test]
    fn dot_paths_reach_embedded_documents_and_arrays() {
        let customer = json!({"address": {"city": "New York", "state": "NY"}});
        assert!(check(json!({"address.city": "New York"}), customer));

        let order = json!({"items": [{"product_id": 3}, {"product_id": 1}]});
        assert!(check(json!({"items.product_id": 1}), order.clone()));
        assert!(!check(json!({"items.product_id": 7}), order));
    }

    #[test]
    fn regex_with_options() {
        let product = json!({"name": "Laptop Pro 15", "specifications": {"connectivity": "Wireless 2.4GHz"}});
        assert!(check(json!({"name": {"$regex": "laptop", "$options": "i"}}), product.clone()));
        assert!(!check(json!({"name": {"$regex": "laptop"}}), product.clone()));
        assert!(check(
            json!({"specifications.connectivity": {"$regex": "wireless", "$options": "i"}}),
            product
        ));
    }

    #[test]
    fn expr_compares_computed_values() {
        let filter = json!({"$expr": {"$gt": [{"$size": "$items"}, 2]}});
        assert!(check(filter.clone(), json!({"items": [1, 2, 3]})));
        assert!(!check(filter, json!({"items": [1]})));

        let dept = json!({"employees": {"salary": 9000}, "dept_avg_salary": 5760});
        assert!(check(
            json!({"$expr": {"$gt": ["$employees.salary", "$dept_avg_salary"]}}),
            dept
        ));
    }

    #[test]
    fn logical_operators() {
        let doc = json!({"category": "Audio", "price": 159.99});
        assert!(check(
            json!({"$or": [{"category": "Electronics"}, {"price": {"$gt": 100}}]}),
            doc.clone()
        ));
        assert!(!check(json!({"$nor": [{"category": "Audio"}]}), doc.clone()));
        assert!(check(json!({"category": {"$exists": true}, "stock": {"$exists": false}}), doc));
    }

    #[test]
    fn text_inside_or_is_bound_and_scored() {
        let mut filter = Filter::parse(&json!({
            "$or": [{"price": {"$lt": 20}}, {"$text": {"$search": "wireless"}}]
        }))
        .unwrap();
        filter
            .text_query_mut()
            .unwrap()
            .bind(&["name".to_string(), "description".to_string()]);

        let mouse = json!({"name": "Wireless Mouse", "description": "Ergonomic mouse", "price": 29.99});
        let cable = json!({"name": "USB Cable 3-Pack", "description": "Cables", "price": 15.99});
        let hub = json!({"name": "USB-C Hub", "description": "7-in-1 hub", "price": 49.99});
        assert!(filter.matches(&mouse).unwrap());
        assert!(filter.text_score(&mouse).unwrap().is_some());
        assert!(filter.matches(&cable).unwrap());
        assert_eq!(filter.text_score(&cable).unwrap(), None);
        assert!(!filter.matches(&hub).unwrap());
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(Filter::parse(&json!({"$where": "1"})).is_err());
        assert!(Filter::parse(&json!({"a": {"$between": [1, 2]}})).is_err());
        assert!(Filter::parse(&json!({"a": {"$regex": "("}})).is_err());
        assert!(Filter::parse(&json!({"$or": []})).is_err());
        assert!(Filter::parse(&json!([1])).is_err());
    }
}
