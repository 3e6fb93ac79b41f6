//! Aggregation expressions: field paths, literals and operator calls such
//! as `{"$concat": ["$first_name", " ", "$last_name"]}`.
//!
//! Evaluation returns `Ok(None)` for a missing value so callers can tell a
//! missing field from an explicit `null` (`$project` omits the former).

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::app_response::{AppResponse, Result};
use crate::document::{compare_values, float_value, resolve_path, values_equal, Numeric};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Concat,
    Round,
    Divide,
    Multiply,
    Add,
    Subtract,
    Size,
    Substr,
    Avg,
    Sum,
    Min,
    Max,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Cond,
    IfNull,
    ToUpper,
    ToLower,
}

impl Operator {
    fn from_name(name: &str) -> Option<Operator> {
        let op = match name {
            "$concat" => Operator::Concat,
            "$round" => Operator::Round,
            "$divide" => Operator::Divide,
            "$multiply" => Operator::Multiply,
            "$add" => Operator::Add,
            "$subtract" => Operator::Subtract,
            "$size" => Operator::Size,
            "$substr" | "$substrBytes" => Operator::Substr,
            "$avg" => Operator::Avg,
            "$sum" => Operator::Sum,
            "$min" => Operator::Min,
            "$max" => Operator::Max,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$and" => Operator::And,
            "$or" => Operator::Or,
            "$not" => Operator::Not,
            "$cond" => Operator::Cond,
            "$ifNull" => Operator::IfNull,
            "$toUpper" => Operator::ToUpper,
            "$toLower" => Operator::ToLower,
            _ => return None,
        };
        Some(op)
    }

    fn name(self) -> &'static str {
        match self {
            Operator::Concat => "$concat",
            Operator::Round => "$round",
            Operator::Divide => "$divide",
            Operator::Multiply => "$multiply",
            Operator::Add => "$add",
            Operator::Subtract => "$subtract",
            Operator::Size => "$size",
            Operator::Substr => "$substr",
            Operator::Avg => "$avg",
            Operator::Sum => "$sum",
            Operator::Min => "$min",
            Operator::Max => "$max",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::And => "$and",
            Operator::Or => "$or",
            Operator::Not => "$not",
            Operator::Cond => "$cond",
            Operator::IfNull => "$ifNull",
            Operator::ToUpper => "$toUpper",
            Operator::ToLower => "$toLower",
        }
    }

    /// Allowed argument counts, inclusive.
    fn arity(self) -> (usize, usize) {
        match self {
            Operator::Size | Operator::Not | Operator::ToUpper | Operator::ToLower => (1, 1),
            Operator::Round => (1, 2),
            Operator::Divide | Operator::Subtract => (2, 2),
            Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte
            | Operator::Eq
            | Operator::Ne => (2, 2),
            Operator::Substr | Operator::Cond => (3, 3),
            Operator::IfNull => (2, usize::MAX),
            _ => (0, usize::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// `$a.b` relative to the current document.
    FieldPath(String),
    /// `$$ROOT` / `$$CURRENT`, optionally followed by a path.
    Root(Option<String>),
    Object(Vec<(String, Expression)>),
    Array(Vec<Expression>),
    Call(Operator, Vec<Expression>),
}

impl Expression {
    pub fn parse(value: &Value) -> Result<Expression> {
        match value {
            Value::String(s) if s.starts_with("$$") => parse_variable(&s[2..]),
            Value::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                if path.is_empty() {
                    return Err(AppResponse::invalid("'$' is not a valid field path"));
                }
                Ok(Expression::FieldPath(path.to_string()))
            }
            Value::Array(items) => Ok(Expression::Array(
                items.iter().map(Expression::parse).collect::<Result<_>>()?,
            )),
            Value::Object(map) => parse_object(map),
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    /// Evaluates against `doc`; `Ok(None)` means the value is missing.
    pub fn evaluate(&self, doc: &Value) -> Result<Option<Value>> {
        match self {
            Expression::Literal(v) => Ok(Some(v.clone())),
            Expression::FieldPath(path) => Ok(resolve_path(doc, path)),
            Expression::Root(None) => Ok(Some(doc.clone())),
            Expression::Root(Some(path)) => Ok(resolve_path(doc, path)),
            Expression::Object(fields) => {
                let mut out = Map::new();
                for (key, expr) in fields {
                    if let Some(v) = expr.evaluate(doc)? {
                        out.insert(key.clone(), v);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Expression::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for expr in items {
                    out.push(expr.evaluate(doc)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(out)))
            }
            Expression::Call(op, args) => evaluate_call(*op, args, doc),
        }
    }

    /// Evaluates and maps a missing value to `null`.
    pub fn evaluate_or_null(&self, doc: &Value) -> Result<Value> {
        Ok(self.evaluate(doc)?.unwrap_or(Value::Null))
    }
}

fn parse_variable(name: &str) -> Result<Expression> {
    let (var, path) = match name.split_once('.') {
        Some((var, path)) => (var, Some(path.to_string())),
        None => (name, None),
    };
    match var {
        "ROOT" | "CURRENT" => Ok(Expression::Root(path)),
        other => Err(AppResponse::invalid(format!(
            "use of undefined variable: $${}",
            other
        ))),
    }
}

fn parse_object(map: &Map<String, Value>) -> Result<Expression> {
    let operator_key = map.keys().find(|k| k.starts_with('$'));
    let Some(key) = operator_key else {
        let fields = map
            .iter()
            .map(|(k, v)| Ok((k.clone(), Expression::parse(v)?)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Expression::Object(fields));
    };

    if map.len() != 1 {
        return Err(AppResponse::invalid(format!(
            "an expression object with operator '{}' must have exactly one field",
            key
        )));
    }
    let operand = &map[key.as_str()];

    if key == "$literal" {
        return Ok(Expression::Literal(operand.clone()));
    }

    let op = Operator::from_name(key)
        .ok_or_else(|| AppResponse::invalid(format!("unrecognized expression operator '{}'", key)))?;

    let args = match (op, operand) {
        (Operator::Cond, Value::Object(branches)) => {
            let branch = |name: &str| {
                branches.get(name).ok_or_else(|| {
                    AppResponse::invalid(format!("$cond is missing the '{}' branch", name))
                })
            };
            vec![
                Expression::parse(branch("if")?)?,
                Expression::parse(branch("then")?)?,
                Expression::parse(branch("else")?)?,
            ]
        }
        (_, Value::Array(items)) => items.iter().map(Expression::parse).collect::<Result<_>>()?,
        (_, single) => vec![Expression::parse(single)?],
    };

    let (min, max) = op.arity();
    if args.len() < min || args.len() > max {
        return Err(AppResponse::invalid(format!(
            "{} received {} arguments",
            op.name(),
            args.len()
        )));
    }
    Ok(Expression::Call(op, args))
}

fn is_truthy(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(_) => true,
    }
}

fn is_nullish(value: &Option<Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn numeric_arg(op: Operator, value: &Value) -> Result<Numeric> {
    Numeric::from_value(value).ok_or_else(|| {
        AppResponse::invalid(format!("{} only supports numeric types, not {}", op.name(), value))
    })
}

/// Operands of `$sum`/`$avg`/`$min`/`$max`: a single array argument is
/// spread, otherwise every argument counts.
fn spread_operands(values: Vec<Option<Value>>) -> Vec<Value> {
    if values.len() == 1 {
        if let Some(Some(Value::Array(items))) = values.first() {
            return items.clone();
        }
    }
    values.into_iter().flatten().collect()
}

fn evaluate_call(op: Operator, args: &[Expression], doc: &Value) -> Result<Option<Value>> {
    let values = args
        .iter()
        .map(|a| a.evaluate(doc))
        .collect::<Result<Vec<_>>>()?;

    match op {
        Operator::Concat => {
            let mut out = String::new();
            for value in &values {
                match value {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => {
                        return Err(AppResponse::invalid(format!(
                            "$concat only supports strings, not {}",
                            other
                        )))
                    }
                }
            }
            Ok(Some(Value::String(out)))
        }
        Operator::Round => {
            let Some(number) = values[0].as_ref().filter(|v| !v.is_null()) else {
                return Ok(Some(Value::Null));
            };
            let places = match values.get(1) {
                Some(Some(v)) => numeric_arg(op, v)?.as_f64() as i32,
                _ => 0,
            };
            Ok(Some(round_to(numeric_arg(op, number)?, places)))
        }
        Operator::Divide => {
            if values.iter().any(is_nullish) {
                return Ok(Some(Value::Null));
            }
            let dividend = numeric_arg(op, values[0].as_ref().unwrap_or(&Value::Null))?;
            let divisor = numeric_arg(op, values[1].as_ref().unwrap_or(&Value::Null))?;
            if divisor.as_f64() == 0.0 {
                return Err(AppResponse::invalid("can't $divide by zero"));
            }
            Ok(Some(float_value(dividend.as_f64() / divisor.as_f64())))
        }
        Operator::Multiply | Operator::Add => {
            let mut acc = Numeric::Int(if op == Operator::Multiply { 1 } else { 0 });
            for value in &values {
                match value {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(v) => {
                        let n = numeric_arg(op, v)?;
                        acc = if op == Operator::Multiply { acc.mul(n) } else { acc.add(n) };
                    }
                }
            }
            Ok(Some(acc.into_value()))
        }
        Operator::Subtract => {
            if values.iter().any(is_nullish) {
                return Ok(Some(Value::Null));
            }
            let left = numeric_arg(op, values[0].as_ref().unwrap_or(&Value::Null))?;
            let right = numeric_arg(op, values[1].as_ref().unwrap_or(&Value::Null))?;
            Ok(Some(left.sub(right).into_value()))
        }
        Operator::Size => match &values[0] {
            Some(Value::Array(items)) => Ok(Some(Value::from(items.len()))),
            Some(other) => Err(AppResponse::invalid(format!(
                "the argument to $size must be an array, not {}",
                other
            ))),
            None => Err(AppResponse::invalid(
                "the argument to $size must be an array, not missing",
            )),
        },
        Operator::Substr => {
            let text = match &values[0] {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            let start = values[1]
                .as_ref()
                .and_then(|v| v.as_i64())
                .filter(|s| *s >= 0)
                .ok_or_else(|| AppResponse::invalid("$substr start must be a non-negative integer"))?
                as usize;
            let length = values[2].as_ref().and_then(|v| v.as_i64()).unwrap_or(-1);
            let chars = text.chars().skip(start);
            let out: String = if length < 0 {
                chars.collect()
            } else {
                chars.take(length as usize).collect()
            };
            Ok(Some(Value::String(out)))
        }
        Operator::Sum => {
            let total = spread_operands(values)
                .iter()
                .filter_map(Numeric::from_value)
                .fold(Numeric::Int(0), Numeric::add);
            Ok(Some(total.into_value()))
        }
        Operator::Avg => {
            let numbers: Vec<f64> = spread_operands(values)
                .iter()
                .filter_map(Numeric::from_value)
                .map(Numeric::as_f64)
                .collect();
            if numbers.is_empty() {
                return Ok(Some(Value::Null));
            }
            Ok(Some(float_value(numbers.iter().sum::<f64>() / numbers.len() as f64)))
        }
        Operator::Min | Operator::Max => {
            let wanted = if op == Operator::Min { Ordering::Less } else { Ordering::Greater };
            let best = spread_operands(values)
                .into_iter()
                .filter(|v| !v.is_null())
                .reduce(|best, v| if compare_values(&v, &best) == wanted { v } else { best });
            Ok(Some(best.unwrap_or(Value::Null)))
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Eq | Operator::Ne => {
            let left = values[0].clone().unwrap_or(Value::Null);
            let right = values[1].clone().unwrap_or(Value::Null);
            let ord = compare_values(&left, &right);
            let result = match op {
                Operator::Gt => ord == Ordering::Greater,
                Operator::Gte => ord != Ordering::Less,
                Operator::Lt => ord == Ordering::Less,
                Operator::Lte => ord != Ordering::Greater,
                Operator::Eq => values_equal(&left, &right),
                _ => !values_equal(&left, &right),
            };
            Ok(Some(Value::Bool(result)))
        }
        Operator::And => Ok(Some(Value::Bool(values.iter().all(is_truthy)))),
        Operator::Or => Ok(Some(Value::Bool(values.iter().any(is_truthy)))),
        Operator::Not => Ok(Some(Value::Bool(!is_truthy(&values[0])))),
        Operator::Cond => {
            let branch = if is_truthy(&values[0]) { 1 } else { 2 };
            Ok(values.into_iter().nth(branch).flatten())
        }
        Operator::IfNull => {
            let mut values = values;
            let fallback = values.pop().flatten();
            Ok(values
                .into_iter()
                .find(|candidate| !is_nullish(candidate))
                .flatten()
                .or(fallback))
        }
        Operator::ToUpper | Operator::ToLower => {
            let text = match &values[0] {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            let out = if op == Operator::ToUpper { text.to_uppercase() } else { text.to_lowercase() };
            Ok(Some(Value::String(out)))
        }
    }
}

/// Rounds half to even, keeping integers integral.
fn round_to(number: Numeric, places: i32) -> Value {
    match number {
        Numeric::Int(i) if places >= 0 => Value::from(i),
        Numeric::Int(i) => {
            let factor = 10f64.powi(-places);
            Value::from(((i as f64 / factor).round_ties_even() * factor) as i64)
        }
        Numeric::Float(f) => {
            let factor = 10f64.powi(places);
            float_value((f * factor).round_ties_even() / factor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: Value, doc: Value) -> Option<Value> {
        Expression::parse(&expr).unwrap().evaluate(&doc).unwrap()
    }

    #[test]
    fn concat_builds_full_names() {
        let doc = json!({"manager": {"first_name": "Steven", "last_name": "King"}});
        let out = eval(
            json!({"$concat": ["$manager.first_name", " ", "$manager.last_name"]}),
            doc,
        );
        assert_eq!(out, Some(json!("Steven King")));
    }

    #[test]
    fn concat_with_missing_part_is_null() {
        let out = eval(json!({"$concat": ["$first", " ", "$last"]}), json!({"first": "Ann"}));
        assert_eq!(out, Some(Value::Null));
    }

    #[test]
    fn round_and_divide_nest() {
        let doc = json!({"total_spent": 1000.0, "order_count": 3});
        let out = eval(
            json!({"$round": [{"$divide": ["$total_spent", "$order_count"]}, 2]}),
            doc,
        );
        assert_eq!(out, Some(json!(333.33)));
    }

    #[test]
    fn round_uses_half_even() {
        assert_eq!(eval(json!({"$round": [2.5, 0]}), json!({})), Some(json!(2.0)));
        assert_eq!(eval(json!({"$round": [3.5, 0]}), json!({})), Some(json!(4.0)));
        assert_eq!(eval(json!({"$round": ["$n", 2]}), json!({"n": 17})), Some(json!(17)));
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let expr = Expression::parse(&json!({"$divide": ["$a", 0]})).unwrap();
        assert!(expr.evaluate(&json!({"a": 5})).is_err());
    }

    #[test]
    fn size_requires_an_array() {
        let expr = Expression::parse(&json!({"$size": "$items"})).unwrap();
        assert_eq!(
            expr.evaluate(&json!({"items": [1, 2, 3]})).unwrap(),
            Some(json!(3))
        );
        assert!(expr.evaluate(&json!({})).is_err());
    }

    #[test]
    fn comparison_inside_expr() {
        let expr = json!({"$gt": [{"$size": "$items"}, 2]});
        assert_eq!(eval(expr.clone(), json!({"items": [1, 2, 3]})), Some(json!(true)));
        assert_eq!(eval(expr, json!({"items": [1, 2]})), Some(json!(false)));
    }

    #[test]
    fn multiply_keeps_integers() {
        let out = eval(json!({"$multiply": ["$q", "$p"]}), json!({"q": 2, "p": 3}));
        assert_eq!(out, Some(json!(6)));
    }

    #[test]
    fn avg_over_array_field() {
        let doc = json!({"reviews": [{"rating": 5}, {"rating": 4}]});
        assert_eq!(eval(json!({"$avg": "$reviews.rating"}), doc), Some(json!(4.5)));
        assert_eq!(
            eval(json!({"$avg": "$reviews.rating"}), json!({"reviews": []})),
            Some(Value::Null)
        );
    }

    #[test]
    fn substr_extracts_month() {
        let out = eval(json!({"$substr": ["$order_date", 0, 7]}), json!({"order_date": "2024-03-28"}));
        assert_eq!(out, Some(json!("2024-03")));
    }

    #[test]
    fn root_variable_and_object_literals() {
        let doc = json!({"effective_date": "2020-01-01", "salary": 9500});
        assert_eq!(eval(json!("$$ROOT"), doc.clone()), Some(doc.clone()));
        assert_eq!(
            eval(json!({"date": "$effective_date", "salary": "$salary"}), doc),
            Some(json!({"date": "2020-01-01", "salary": 9500}))
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(Expression::parse(&json!({"$bogus": 1})).is_err());
        assert!(Expression::parse(&json!("$$NOW")).is_err());
    }
}
