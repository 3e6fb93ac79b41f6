//! Aggregation pipelines.
//!
//! A pipeline is parsed once into a list of [`Stage`]s and executed over the
//! documents of one collection. Each row carries the text relevance score
//! computed by a leading `$text` match so later `$project` and `$sort`
//! stages can read it through `{$meta: "textScore"}`. `$group` starts new
//! rows without a score.
//!
//! `$lookup` reads its foreign collection through [`CollectionSource`], which
//! the store implements and tests can stand in for with a map of fixtures.

use std::collections::HashMap;

use log::debug;
use serde_json::{Map, Value};

use crate::app_response::{AppResponse, Result};
use crate::document::{
    compare_values, float_value, get_path, path_values, remove_path, resolve_path, set_path,
    values_equal, Numeric, ID_FIELD,
};
use crate::local_db_state::AppDbState;
use crate::query::expression::Expression;
use crate::query::filter::Filter;
use crate::query::projection::Projection;
use crate::query::sort::SortSpec;
use crate::query::text::TextQuery;

/// Where `$lookup` finds the documents of another collection.
pub trait CollectionSource {
    fn load_collection(&self, name: &str) -> Result<Vec<Value>>;
}

impl CollectionSource for AppDbState {
    fn load_collection(&self, name: &str) -> Result<Vec<Value>> {
        self.documents(name)
    }
}

impl CollectionSource for HashMap<String, Vec<Value>> {
    fn load_collection(&self, name: &str) -> Result<Vec<Value>> {
        Ok(self.get(name).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    Count,
}

impl Accumulator {
    fn from_name(name: &str) -> Option<Accumulator> {
        Some(match name {
            "$sum" => Accumulator::Sum,
            "$avg" => Accumulator::Avg,
            "$min" => Accumulator::Min,
            "$max" => Accumulator::Max,
            "$first" => Accumulator::First,
            "$last" => Accumulator::Last,
            "$push" => Accumulator::Push,
            "$addToSet" => Accumulator::AddToSet,
            "$count" => Accumulator::Count,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupField {
    pub name: String,
    pub accumulator: Accumulator,
    pub expression: Expression,
}

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Group {
        id: Expression,
        fields: Vec<GroupField>,
    },
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    Unwind {
        path: String,
        preserve_null_and_empty: bool,
        include_array_index: Option<String>,
    },
    Project(Projection),
    AddFields(Vec<(String, Expression)>),
    Sort(SortSpec),
    Limit(usize),
    Skip(usize),
    Count(String),
}

type Row = (Value, Option<f64>);

#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn parse(stages: &[Value]) -> Result<Pipeline> {
        let stages = stages.iter().map(parse_stage).collect::<Result<Vec<_>>>()?;

        let late_text = stages.iter().skip(1).any(|stage| {
            matches!(stage, Stage::Match(filter) if filter.text_query().is_some())
        });
        if late_text {
            return Err(AppResponse::invalid(
                "$match with $text is only allowed as the first pipeline stage",
            ));
        }

        let pipeline = Pipeline { stages };
        let wants_score = pipeline.stages.iter().any(|stage| match stage {
            Stage::Project(projection) => projection.uses_text_score(),
            Stage::Sort(sort) => sort.uses_text_score(),
            _ => false,
        });
        if wants_score && pipeline.text_query().is_none() {
            return Err(AppResponse::invalid("textScore requires a leading $match with $text"));
        }

        Ok(pipeline)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The `$text` query of a leading `$match`, if any.
    pub fn text_query(&self) -> Option<&TextQuery> {
        match self.stages.first() {
            Some(Stage::Match(filter)) => filter.text_query(),
            _ => None,
        }
    }

    /// Binds a leading `$text` match to the fields of the collection's text
    /// index.
    pub fn bind_text_index(&mut self, fields: &[String]) {
        if let Some(Stage::Match(filter)) = self.stages.first_mut() {
            if let Some(query) = filter.text_query_mut() {
                query.bind(fields);
            }
        }
    }

    pub fn execute<S>(&self, docs: Vec<Value>, source: &S) -> Result<Vec<Value>>
    where
        S: CollectionSource + ?Sized,
    {
        let mut rows: Vec<Row> = docs.into_iter().map(|doc| (doc, None)).collect();

        for stage in &self.stages {
            let before = rows.len();
            rows = run_stage(stage, rows, source)?;
            debug!("{} stage: {} -> {} documents", stage_name(stage), before, rows.len());
        }

        Ok(rows.into_iter().map(|(doc, _)| doc).collect())
    }
}

fn stage_name(stage: &Stage) -> &'static str {
    match stage {
        Stage::Match(_) => "$match",
        Stage::Group { .. } => "$group",
        Stage::Lookup { .. } => "$lookup",
        Stage::Unwind { .. } => "$unwind",
        Stage::Project(_) => "$project",
        Stage::AddFields(_) => "$addFields",
        Stage::Sort(_) => "$sort",
        Stage::Limit(_) => "$limit",
        Stage::Skip(_) => "$skip",
        Stage::Count(_) => "$count",
    }
}

fn parse_stage(value: &Value) -> Result<Stage> {
    let map = value
        .as_object()
        .filter(|map| map.len() == 1)
        .ok_or_else(|| {
            AppResponse::invalid(format!(
                "a pipeline stage must be an object with exactly one field: {}",
                value
            ))
        })?;
    let (name, spec) = map
        .iter()
        .next()
        .ok_or_else(|| AppResponse::invalid("empty pipeline stage"))?;

    match name.as_str() {
        "$match" => Ok(Stage::Match(Filter::parse(spec)?)),
        "$group" => parse_group(spec),
        "$lookup" => {
            let field = |key: &str| {
                spec.get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| AppResponse::invalid(format!("$lookup requires a string '{}'", key)))
            };
            Ok(Stage::Lookup {
                from: field("from")?,
                local_field: field("localField")?,
                foreign_field: field("foreignField")?,
                as_field: field("as")?,
            })
        }
        "$unwind" => parse_unwind(spec),
        "$project" => Ok(Stage::Project(Projection::parse(spec)?)),
        "$addFields" | "$set" => {
            let fields = spec
                .as_object()
                .ok_or_else(|| AppResponse::invalid(format!("{} requires an object", name)))?
                .iter()
                .map(|(path, expr)| Ok((path.clone(), Expression::parse(expr)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Stage::AddFields(fields))
        }
        "$sort" => Ok(Stage::Sort(SortSpec::parse(spec)?)),
        "$limit" => Ok(Stage::Limit(positive_count(name, spec)?)),
        "$skip" => Ok(Stage::Skip(
            spec.as_u64()
                .ok_or_else(|| AppResponse::invalid("$skip requires a non-negative integer"))?
                as usize,
        )),
        "$count" => match spec.as_str() {
            Some(field) if !field.is_empty() && !field.starts_with('$') && !field.contains('.') => {
                Ok(Stage::Count(field.to_string()))
            }
            _ => Err(AppResponse::invalid(
                "$count requires a non-empty field name without '$' or '.'",
            )),
        },
        other => Err(AppResponse::invalid(format!(
            "unrecognized pipeline stage name: '{}'",
            other
        ))),
    }
}

fn positive_count(name: &str, spec: &Value) -> Result<usize> {
    spec.as_u64()
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .ok_or_else(|| AppResponse::invalid(format!("{} requires a positive integer", name)))
}

fn parse_group(spec: &Value) -> Result<Stage> {
    let map = spec
        .as_object()
        .ok_or_else(|| AppResponse::invalid("$group requires an object"))?;
    let id = map
        .get(ID_FIELD)
        .ok_or_else(|| AppResponse::invalid("a group specification must include an _id"))?;
    let id = Expression::parse(id)?;

    let mut fields = Vec::new();
    for (name, acc) in map.iter().filter(|(name, _)| name.as_str() != ID_FIELD) {
        let (op, arg) = acc
            .as_object()
            .filter(|acc| acc.len() == 1)
            .and_then(|acc| acc.iter().next())
            .ok_or_else(|| {
                AppResponse::invalid(format!("the field '{}' must be an accumulator object", name))
            })?;
        let accumulator = Accumulator::from_name(op).ok_or_else(|| {
            AppResponse::invalid(format!("unknown group operator '{}'", op))
        })?;
        let expression = if accumulator == Accumulator::Count {
            Expression::Literal(Value::from(1))
        } else {
            Expression::parse(arg)?
        };
        fields.push(GroupField {
            name: name.clone(),
            accumulator,
            expression,
        });
    }
    Ok(Stage::Group { id, fields })
}

fn parse_unwind(spec: &Value) -> Result<Stage> {
    let (path, preserve, index) = match spec {
        Value::String(path) => (path.as_str(), false, None),
        Value::Object(options) => (
            options
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| AppResponse::invalid("$unwind requires a 'path' string"))?,
            options
                .get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            options
                .get("includeArrayIndex")
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        _ => return Err(AppResponse::invalid("$unwind requires a string or an object")),
    };
    let path = path
        .strip_prefix('$')
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppResponse::invalid("$unwind path must be prefixed by '$'"))?;
    Ok(Stage::Unwind {
        path: path.to_string(),
        preserve_null_and_empty: preserve,
        include_array_index: index,
    })
}

fn run_stage<S>(stage: &Stage, rows: Vec<Row>, source: &S) -> Result<Vec<Row>>
where
    S: CollectionSource + ?Sized,
{
    match stage {
        Stage::Match(filter) => {
            let mut out = Vec::with_capacity(rows.len());
            for (doc, score) in rows {
                if filter.matches(&doc)? {
                    let score = match filter.text_query() {
                        Some(query) => query.score(&doc)?,
                        None => score,
                    };
                    out.push((doc, score));
                }
            }
            Ok(out)
        }
        Stage::Group { id, fields } => group(id, fields, rows),
        Stage::Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
        } => {
            let foreign = source.load_collection(from)?;
            let mut out = Vec::with_capacity(rows.len());
            for (doc, score) in rows {
                let local = resolve_path(&doc, local_field);
                let joined: Vec<Value> = foreign
                    .iter()
                    .filter(|candidate| lookup_matches(local.as_ref(), candidate, foreign_field))
                    .cloned()
                    .collect();
                out.push((with_field(doc, as_field, Value::Array(joined))?, score));
            }
            Ok(out)
        }
        Stage::Unwind {
            path,
            preserve_null_and_empty,
            include_array_index,
        } => unwind(rows, path, *preserve_null_and_empty, include_array_index.as_deref()),
        Stage::Project(projection) => rows
            .into_iter()
            .map(|(doc, score)| Ok((projection.apply(&doc, score)?, score)))
            .collect(),
        Stage::AddFields(fields) => {
            let mut out = Vec::with_capacity(rows.len());
            for (doc, score) in rows {
                let mut values = Vec::with_capacity(fields.len());
                for (path, expr) in fields {
                    values.push((path, expr.evaluate(&doc)?));
                }
                let mut doc = doc;
                for (path, value) in values {
                    if let Some(value) = value {
                        doc = with_field(doc, path, value)?;
                    }
                }
                out.push((doc, score));
            }
            Ok(out)
        }
        Stage::Sort(spec) => {
            let mut rows = rows;
            spec.sort_scored(&mut rows);
            Ok(rows)
        }
        Stage::Limit(n) => Ok(rows.into_iter().take(*n).collect()),
        Stage::Skip(n) => Ok(rows.into_iter().skip(*n).collect()),
        Stage::Count(field) => {
            if rows.is_empty() {
                return Ok(rows);
            }
            let mut doc = Map::new();
            doc.insert(field.clone(), Value::from(rows.len()));
            Ok(vec![(Value::Object(doc), None)])
        }
    }
}

fn with_field(doc: Value, path: &str, value: Value) -> Result<Value> {
    match doc {
        Value::Object(mut map) => {
            set_path(&mut map, path, value)?;
            Ok(Value::Object(map))
        }
        other => Err(AppResponse::invalid(format!("expected a document, got {}", other))),
    }
}

/// Equality join: an array local value matches on any element, and a
/// missing or null local value matches foreign documents whose field is
/// null or missing.
fn lookup_matches(local: Option<&Value>, candidate: &Value, foreign_field: &str) -> bool {
    let foreign: Vec<&Value> = path_values(candidate, foreign_field)
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect();

    match local {
        None | Some(Value::Null) => foreign.is_empty() || foreign.iter().any(|v| v.is_null()),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| foreign.iter().any(|v| values_equal(item, v))),
        Some(value) => foreign.iter().any(|v| values_equal(value, v)),
    }
}

fn unwind(rows: Vec<Row>, path: &str, preserve: bool, index_field: Option<&str>) -> Result<Vec<Row>> {
    let mut out = Vec::with_capacity(rows.len());
    for (doc, score) in rows {
        let Value::Object(map) = &doc else {
            continue;
        };
        match get_path(map, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for (index, item) in items.into_iter().enumerate() {
                    let mut row = with_field(doc.clone(), path, item)?;
                    if let Some(field) = index_field {
                        row = with_field(row, field, Value::from(index))?;
                    }
                    out.push((row, score));
                }
            }
            Some(Value::Array(_)) => {
                if preserve {
                    let mut map = map.clone();
                    remove_path(&mut map, path);
                    let mut row = Value::Object(map);
                    if let Some(field) = index_field {
                        row = with_field(row, field, Value::Null)?;
                    }
                    out.push((row, score));
                }
            }
            None | Some(Value::Null) => {
                if preserve {
                    let mut row = doc.clone();
                    if let Some(field) = index_field {
                        row = with_field(row, field, Value::Null)?;
                    }
                    out.push((row, score));
                }
            }
            Some(_) => {
                // A scalar unwinds to itself.
                let mut row = doc.clone();
                if let Some(field) = index_field {
                    row = with_field(row, field, Value::Null)?;
                }
                out.push((row, score));
            }
        }
    }
    Ok(out)
}

#[derive(Debug)]
enum AccState {
    Sum(Numeric),
    Avg { total: f64, count: usize },
    Extreme(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Values(Vec<Value>),
}

impl AccState {
    fn new(accumulator: Accumulator) -> AccState {
        match accumulator {
            Accumulator::Sum | Accumulator::Count => AccState::Sum(Numeric::Int(0)),
            Accumulator::Avg => AccState::Avg { total: 0.0, count: 0 },
            Accumulator::Min | Accumulator::Max => AccState::Extreme(None),
            Accumulator::First => AccState::First(None),
            Accumulator::Last => AccState::Last(Value::Null),
            Accumulator::Push | Accumulator::AddToSet => AccState::Values(Vec::new()),
        }
    }

    fn feed(&mut self, accumulator: Accumulator, value: Option<Value>) {
        match self {
            AccState::Sum(total) => {
                if let Some(n) = value.as_ref().and_then(Numeric::from_value) {
                    *total = total.add(n);
                }
            }
            AccState::Avg { total, count } => {
                if let Some(n) = value.as_ref().and_then(Numeric::from_value) {
                    *total += n.as_f64();
                    *count += 1;
                }
            }
            AccState::Extreme(best) => {
                let Some(value) = value.filter(|v| !v.is_null()) else {
                    return;
                };
                let replace = match best {
                    None => true,
                    Some(current) => {
                        let ord = compare_values(&value, current);
                        if accumulator == Accumulator::Min {
                            ord.is_lt()
                        } else {
                            ord.is_gt()
                        }
                    }
                };
                if replace {
                    *best = Some(value);
                }
            }
            AccState::First(first) => {
                if first.is_none() {
                    *first = Some(value.unwrap_or(Value::Null));
                }
            }
            AccState::Last(last) => *last = value.unwrap_or(Value::Null),
            AccState::Values(values) => {
                let Some(value) = value else {
                    return;
                };
                if accumulator == Accumulator::Push
                    || !values.iter().any(|existing| values_equal(existing, &value))
                {
                    values.push(value);
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(total) => total.into_value(),
            AccState::Avg { count: 0, .. } => Value::Null,
            AccState::Avg { total, count } => float_value(total / count as f64),
            AccState::Extreme(best) => best.unwrap_or(Value::Null),
            AccState::First(first) => first.unwrap_or(Value::Null),
            AccState::Last(last) => last,
            AccState::Values(values) => Value::Array(values),
        }
    }
}

/// Group key with integral floats folded into integers, so `60` and `60.0`
/// land in one group.
fn group_key(value: &Value) -> String {
    fn canonical(value: &Value) -> Value {
        match value {
            Value::Number(n) if n.as_i64().is_none() => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
                _ => value.clone(),
            },
            Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
            Value::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), canonical(v))).collect(),
            ),
            other => other.clone(),
        }
    }
    canonical(value).to_string()
}

fn group(id: &Expression, fields: &[GroupField], rows: Vec<Row>) -> Result<Vec<Row>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

    for (doc, _) in rows {
        let key = id.evaluate_or_null(&doc)?;
        let slot = match positions.get(&group_key(&key)) {
            Some(slot) => *slot,
            None => {
                positions.insert(group_key(&key), groups.len());
                let states = fields.iter().map(|f| AccState::new(f.accumulator)).collect();
                groups.push((key, states));
                groups.len() - 1
            }
        };

        let states = &mut groups[slot].1;
        for (field, state) in fields.iter().zip(states.iter_mut()) {
            state.feed(field.accumulator, field.expression.evaluate(&doc)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            out.insert(ID_FIELD.to_string(), key);
            for (field, state) in fields.iter().zip(states) {
                out.insert(field.name.clone(), state.finish());
            }
            (Value::Object(out), None)
        })
        .collect())
}
