//! The example query catalog.
//!
//! Each entry is a standalone request against the sample collections,
//! numbered the same way as the query scripts it documents. Entries that
//! destroy data are marked `inert` and only run when forced.

mod ecommerce;
mod hr;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::app_response::{AppResponse, Result};
use crate::collection::{DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateResult};
use crate::local_db_state::AppDbState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Hr,
    Ecommerce,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Hr => "hr",
            Domain::Ecommerce => "ecommerce",
        }
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AppResponse;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hr" => Ok(Domain::Hr),
            "ecommerce" | "e-commerce" => Ok(Domain::Ecommerce),
            other => Err(AppResponse::BadRequest(format!(
                "unknown domain '{}', expected 'hr' or 'ecommerce'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    BasicQuery,
    Projection,
    SortLimit,
    Relationships,
    EmbeddedDocuments,
    ArrayOperations,
    CustomerQueries,
    OrderQueries,
    Aggregation,
    Analytics,
    Insert,
    Update,
    Delete,
    Reviews,
    Inventory,
    TextSearch,
    ComplexQueries,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Request {
    Find {
        collection: &'static str,
        filter: Value,
        #[serde(skip_serializing_if = "is_default_options")]
        options: FindOptions,
    },
    FindOne {
        collection: &'static str,
        filter: Value,
    },
    Aggregate {
        collection: &'static str,
        pipeline: Vec<Value>,
    },
    InsertOne {
        collection: &'static str,
        document: Value,
    },
    InsertMany {
        collection: &'static str,
        documents: Vec<Value>,
    },
    UpdateOne {
        collection: &'static str,
        filter: Value,
        update: Value,
    },
    UpdateMany {
        collection: &'static str,
        filter: Value,
        update: Value,
    },
    DeleteOne {
        collection: &'static str,
        filter: Value,
    },
    DeleteMany {
        collection: &'static str,
        filter: Value,
    },
    CreateIndex {
        collection: &'static str,
        keys: Value,
    },
    /// Fetches a document by id, then the document its `field` points at.
    Dereference {
        collection: &'static str,
        id: Value,
        field: &'static str,
        target: &'static str,
    },
}

fn is_default_options(options: &FindOptions) -> bool {
    *options == FindOptions::default()
}

impl Request {
    pub fn collection(&self) -> &'static str {
        match self {
            Request::Find { collection, .. }
            | Request::FindOne { collection, .. }
            | Request::Aggregate { collection, .. }
            | Request::InsertOne { collection, .. }
            | Request::InsertMany { collection, .. }
            | Request::UpdateOne { collection, .. }
            | Request::UpdateMany { collection, .. }
            | Request::DeleteOne { collection, .. }
            | Request::DeleteMany { collection, .. }
            | Request::CreateIndex { collection, .. }
            | Request::Dereference { collection, .. } => collection,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Request::Find { .. }
                | Request::FindOne { .. }
                | Request::Aggregate { .. }
                | Request::Dereference { .. }
        )
    }

    pub fn execute(&self, db: &AppDbState) -> Result<Outcome> {
        let outcome = match self {
            Request::Find {
                collection,
                filter,
                options,
            } => Outcome::Documents(db.collection(collection).find_with_options(filter, options)?),
            Request::FindOne { collection, filter } => {
                Outcome::Document(db.collection(collection).find_one(filter)?)
            }
            Request::Aggregate {
                collection,
                pipeline,
            } => Outcome::Documents(db.collection(collection).aggregate(pipeline)?),
            Request::InsertOne {
                collection,
                document,
            } => Outcome::InsertedOne(db.collection(collection).insert_one(document.clone())?),
            Request::InsertMany {
                collection,
                documents,
            } => Outcome::InsertedMany(db.collection(collection).insert_many(documents.clone())?),
            Request::UpdateOne {
                collection,
                filter,
                update,
            } => Outcome::Updated(db.collection(collection).update_one(filter, update)?),
            Request::UpdateMany {
                collection,
                filter,
                update,
            } => Outcome::Updated(db.collection(collection).update_many(filter, update)?),
            Request::DeleteOne { collection, filter } => {
                Outcome::Deleted(db.collection(collection).delete_one(filter)?)
            }
            Request::DeleteMany { collection, filter } => {
                Outcome::Deleted(db.collection(collection).delete_many(filter)?)
            }
            Request::CreateIndex { collection, keys } => {
                Outcome::IndexCreated(db.collection(collection).create_index(keys)?)
            }
            Request::Dereference {
                collection,
                id,
                field,
                target,
            } => {
                let source = db.collection(collection).find_by_id(id)?.ok_or_else(|| {
                    AppResponse::NotFound(format!("no document {} in '{}'", id, collection))
                })?;
                let reference = source.get(*field).cloned().unwrap_or(Value::Null);
                let target = if reference.is_null() {
                    None
                } else {
                    db.collection(target).find_by_id(&reference)?
                };
                Outcome::Dereferenced { source, target }
            }
        };
        Ok(outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Documents(Vec<Value>),
    Document(Option<Value>),
    InsertedOne(InsertOneResult),
    InsertedMany(InsertManyResult),
    Updated(UpdateResult),
    Deleted(DeleteResult),
    IndexCreated(String),
    Dereferenced {
        source: Value,
        target: Option<Value>,
    },
    /// An inert entry that was not forced.
    Skipped { skipped: String },
}

impl Outcome {
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn documents(&self) -> &[Value] {
        match self {
            Outcome::Documents(docs) => docs,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub domain: Domain,
    pub number: u32,
    pub title: &'static str,
    pub theme: Theme,
    pub request: Request,
    /// Destructive example that only runs when forced.
    pub inert: bool,
}

impl CatalogEntry {
    pub(crate) fn new(domain: Domain, number: u32, title: &'static str, theme: Theme, request: Request) -> Self {
        CatalogEntry {
            domain,
            number,
            title,
            theme,
            request,
            inert: false,
        }
    }

    pub(crate) fn inert(mut self) -> Self {
        self.inert = true;
        self
    }

    /// `hr-17`, `ecommerce-48`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.domain, self.number)
    }

    pub fn run(&self, db: &AppDbState, force: bool) -> Result<Outcome> {
        if self.inert && !force {
            warn!("{} is inert; force it to run '{}'", self.key(), self.title);
            return Ok(Outcome::Skipped {
                skipped: format!("{} is inert", self.key()),
            });
        }
        debug!("Running {}: {}", self.key(), self.title);
        self.request.execute(db)
    }
}

pub fn entries(domain: Option<Domain>) -> Vec<CatalogEntry> {
    match domain {
        Some(Domain::Hr) => hr::entries(),
        Some(Domain::Ecommerce) => ecommerce::entries(),
        None => {
            let mut all = hr::entries();
            all.extend(ecommerce::entries());
            all
        }
    }
}

/// Looks an entry up by key, e.g. `hr-17`.
pub fn entry(key: &str) -> Result<CatalogEntry> {
    let (domain, number) = key
        .rsplit_once('-')
        .ok_or_else(|| AppResponse::BadRequest(format!("invalid catalog key '{}'", key)))?;
    let domain: Domain = domain.parse()?;
    let number: u32 = number
        .parse()
        .map_err(|_| AppResponse::BadRequest(format!("invalid catalog number in '{}'", key)))?;

    entries(Some(domain))
        .into_iter()
        .find(|entry| entry.number == number)
        .ok_or_else(|| AppResponse::NotFound(format!("no catalog entry '{}'", key)))
}

fn find(collection: &'static str, filter: Value) -> Request {
    Request::Find {
        collection,
        filter,
        options: FindOptions::default(),
    }
}

fn find_with(collection: &'static str, filter: Value, options: FindOptions) -> Request {
    Request::Find {
        collection,
        filter,
        options,
    }
}

fn aggregate(collection: &'static str, pipeline: Value) -> Request {
    Request::Aggregate {
        collection,
        pipeline: match pipeline {
            Value::Array(stages) => stages,
            other => vec![other],
        },
    }
}

fn all() -> Value {
    json!({})
}
