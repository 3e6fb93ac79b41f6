//! Collection handles: the document-database request surface (`find`,
//! `update_many`, `aggregate`, ...) on top of [`AppDbState`].
//!
//! Every request scans the collection and evaluates the query in process.
//! Writes go through one LMDB transaction each, so a multi-document insert
//! or update is all-or-nothing.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::app_response::{AppResponse, Result};
use crate::document::ID_FIELD;
use crate::local_db_model::ToDocument;
use crate::local_db_state::{AppDbState, IndexSpec};
use crate::query::{Filter, Pipeline, Projection, SortSpec, UpdateSpec};

pub const ID_INDEX_NAME: &str = "_id_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub matched_count: usize,
    pub modified_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub deleted_count: usize,
}

impl AppDbState {
    pub fn collection(&self, name: &str) -> Collection<'_> {
        Collection {
            db: self,
            name: name.to_string(),
        }
    }
}

pub struct Collection<'a> {
    db: &'a AppDbState,
    name: String,
}

impl Collection<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    // =====================================
    // Inserts
    // =====================================

    pub fn insert_one(&self, document: Value) -> Result<InsertOneResult> {
        let document = with_id(document)?;
        let inserted_id = document[ID_FIELD].clone();
        self.db.insert_documents(&self.name, std::slice::from_ref(&document))?;
        debug!("Inserted {} into '{}'", inserted_id, self.name);
        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts every document or none of them.
    pub fn insert_many(&self, documents: Vec<Value>) -> Result<InsertManyResult> {
        if documents.is_empty() {
            return Err(AppResponse::BadRequest(
                "insert_many requires at least one document".to_string(),
            ));
        }
        let documents = documents
            .into_iter()
            .map(with_id)
            .collect::<Result<Vec<_>>>()?;
        let inserted_ids = documents.iter().map(|doc| doc[ID_FIELD].clone()).collect();

        let count = self.db.insert_documents(&self.name, &documents)?;
        debug!("Inserted {} documents into '{}'", count, self.name);
        Ok(InsertManyResult { inserted_ids })
    }

    /// Inserts typed models, converting each through [`ToDocument`].
    pub fn insert_models<T: ToDocument>(&self, models: &[T]) -> Result<InsertManyResult> {
        let documents = models
            .iter()
            .map(ToDocument::to_document)
            .collect::<Result<Vec<_>>>()?;
        self.insert_many(documents)
    }

    // =====================================
    // Reads
    // =====================================

    pub fn find(&self, filter: &Value) -> Result<Vec<Value>> {
        self.find_with_options(filter, &FindOptions::default())
    }

    pub fn find_with_options(&self, filter: &Value, options: &FindOptions) -> Result<Vec<Value>> {
        let filter = self.prepare_filter(filter)?;
        let projection = options.projection.as_ref().map(Projection::parse).transpose()?;
        let sort = options.sort.as_ref().map(SortSpec::parse).transpose()?;
        if filter.text_query().is_none() {
            if projection.as_ref().is_some_and(Projection::uses_text_score) {
                return Err(AppResponse::InvalidQuery(
                    "projecting textScore requires a $text query".to_string(),
                ));
            }
            if sort.as_ref().is_some_and(SortSpec::uses_text_score) {
                return Err(AppResponse::InvalidQuery(
                    "sorting by textScore requires a $text query".to_string(),
                ));
            }
        }

        let mut rows = Vec::new();
        for doc in self.db.documents(&self.name)? {
            if filter.matches(&doc)? {
                let score = filter.text_score(&doc)?;
                rows.push((doc, score));
            }
        }

        if let Some(sort) = &sort {
            sort.sort_scored(&mut rows);
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        let mut results = Vec::new();
        for (doc, score) in rows.into_iter().skip(options.skip).take(limit) {
            results.push(match &projection {
                Some(projection) => projection.apply(&doc, score)?,
                None => doc,
            });
        }

        debug!("find on '{}' returned {} documents", self.name, results.len());
        Ok(results)
    }

    pub fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        Ok(self
            .find_with_options(filter, &FindOptions::default().limit(1))?
            .into_iter()
            .next())
    }

    pub fn find_by_id(&self, id: &Value) -> Result<Option<Value>> {
        self.db.get_by_id(&self.name, id)
    }

    pub fn count_documents(&self, filter: &Value) -> Result<usize> {
        if filter.as_object().map(Map::is_empty).unwrap_or(false) {
            return self.db.count(&self.name);
        }
        Ok(self.matching(filter)?.len())
    }

    fn matching(&self, filter: &Value) -> Result<Vec<Value>> {
        let filter = self.prepare_filter(filter)?;
        let mut matched = Vec::new();
        for doc in self.db.documents(&self.name)? {
            if filter.matches(&doc)? {
                matched.push(doc);
            }
        }
        Ok(matched)
    }

    // =====================================
    // Updates and deletes
    // =====================================

    pub fn update_one(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        self.update(filter, update, false)
    }

    pub fn update_many(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        self.update(filter, update, true)
    }

    fn update(&self, filter: &Value, update: &Value, multi: bool) -> Result<UpdateResult> {
        let spec = UpdateSpec::parse(update)?;
        let mut matched = self.matching(filter)?;
        if !multi {
            matched.truncate(1);
        }

        let matched_count = matched.len();
        let mut changed = Vec::new();
        for doc in matched {
            let Value::Object(original) = doc else {
                continue;
            };
            let mut updated = original.clone();
            spec.apply(&mut updated)?;
            if updated != original {
                changed.push(Value::Object(updated));
            }
        }

        let modified_count = if changed.is_empty() {
            0
        } else {
            self.db.put_documents(&self.name, &changed)?
        };

        debug!(
            "update on '{}': matched {}, modified {}",
            self.name, matched_count, modified_count
        );
        Ok(UpdateResult {
            matched_count,
            modified_count,
        })
    }

    pub fn delete_one(&self, filter: &Value) -> Result<DeleteResult> {
        self.delete(filter, false)
    }

    pub fn delete_many(&self, filter: &Value) -> Result<DeleteResult> {
        self.delete(filter, true)
    }

    fn delete(&self, filter: &Value, multi: bool) -> Result<DeleteResult> {
        let mut matched = self.matching(filter)?;
        if !multi {
            matched.truncate(1);
        }
        let ids: Vec<Value> = matched
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).cloned())
            .collect();

        let deleted_count = self.db.delete_by_ids(&self.name, &ids)?;
        if deleted_count > 0 {
            info!("Deleted {} documents from '{}'", deleted_count, self.name);
        }
        Ok(DeleteResult { deleted_count })
    }

    // =====================================
    // Aggregation
    // =====================================

    pub fn aggregate(&self, stages: &[Value]) -> Result<Vec<Value>> {
        let mut pipeline = Pipeline::parse(stages)?;
        if pipeline.text_query().is_some() {
            let fields = self.text_index_fields()?;
            pipeline.bind_text_index(&fields);
        }
        let results = pipeline.execute(self.db.documents(&self.name)?, self.db)?;
        debug!(
            "aggregate on '{}' ({} stages) returned {} documents",
            self.name,
            pipeline.stages().len(),
            results.len()
        );
        Ok(results)
    }

    // =====================================
    // Indexes
    // =====================================

    /// Declares an index and returns its name, e.g. `price_1` or
    /// `name_text_description_text`. Declaring the same keys again is a
    /// no-op; a collection holds at most one text index.
    pub fn create_index(&self, keys: &Value) -> Result<String> {
        let map = keys
            .as_object()
            .filter(|map| !map.is_empty())
            .ok_or_else(|| AppResponse::invalid("index keys must be a non-empty object"))?;

        let mut parts = Vec::with_capacity(map.len());
        for (field, kind) in map {
            let suffix = match kind {
                Value::Number(n) if n.as_i64() == Some(1) || n.as_i64() == Some(-1) => n.to_string(),
                Value::String(s) if s == "text" => s.clone(),
                other => {
                    return Err(AppResponse::invalid(format!(
                        "unsupported index type for '{}': {}",
                        field, other
                    )))
                }
            };
            parts.push(format!("{}_{}", field, suffix));
        }

        let spec = IndexSpec {
            name: parts.join("_"),
            keys: keys.clone(),
        };

        let mut specs = self.db.index_specs(&self.name)?;
        if let Some(existing) = specs.iter().find(|s| s.name == spec.name) {
            return Ok(existing.name.clone());
        }
        if spec.is_text() {
            if let Some(other) = specs.iter().find(|s| s.is_text()) {
                return Err(AppResponse::BadRequest(format!(
                    "collection '{}' already has text index '{}'",
                    self.name, other.name
                )));
            }
        }

        let name = spec.name.clone();
        specs.push(spec);
        self.db.save_index_specs(&self.name, &specs)?;
        info!("Created index '{}' on '{}'", name, self.name);
        Ok(name)
    }

    /// Declared indexes, led by the implicit `_id_` index.
    pub fn list_indexes(&self) -> Result<Vec<IndexSpec>> {
        let mut indexes = vec![IndexSpec {
            name: ID_INDEX_NAME.to_string(),
            keys: serde_json::json!({ "_id": 1 }),
        }];
        indexes.extend(self.db.index_specs(&self.name)?);
        Ok(indexes)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        if name == ID_INDEX_NAME {
            return Err(AppResponse::BadRequest("cannot drop _id index".to_string()));
        }
        let mut specs = self.db.index_specs(&self.name)?;
        let before = specs.len();
        specs.retain(|spec| spec.name != name);
        if specs.len() == before {
            return Err(AppResponse::IndexNotFound(format!(
                "index '{}' not found on '{}'",
                name, self.name
            )));
        }
        self.db.save_index_specs(&self.name, &specs)?;
        info!("Dropped index '{}' on '{}'", name, self.name);
        Ok(())
    }

    fn text_index_fields(&self) -> Result<Vec<String>> {
        let specs = self.db.index_specs(&self.name)?;
        match specs.iter().find(|spec| spec.is_text()) {
            Some(spec) => Ok(spec.text_fields()),
            None => {
                warn!("$text query on '{}' without a text index", self.name);
                Err(AppResponse::IndexNotFound(format!(
                    "text index required for $text query on '{}'",
                    self.name
                )))
            }
        }
    }

    fn prepare_filter(&self, filter: &Value) -> Result<Filter> {
        let mut filter = Filter::parse(filter)?;
        if filter.text_query().is_some() {
            let fields = self.text_index_fields()?;
            if let Some(query) = filter.text_query_mut() {
                query.bind(&fields);
            }
        }
        Ok(filter)
    }
}

/// Validates a document for insertion, generating a UUID `_id` when it has
/// none.
fn with_id(document: Value) -> Result<Value> {
    let mut map = match document {
        Value::Object(map) => map,
        other => {
            return Err(AppResponse::ValidationError(format!(
                "only documents can be inserted, got {}",
                other
            )))
        }
    };
    if !map.contains_key(ID_FIELD) {
        // Keep `_id` as the first key.
        let mut with_id = Map::with_capacity(map.len() + 1);
        with_id.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        with_id.append(&mut map);
        map = with_id;
    }
    Ok(Value::Object(map))
}
