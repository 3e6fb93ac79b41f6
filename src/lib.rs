//! # Sample Docstore
//!
//! An embedded document store with the HR and e-commerce sample data used to
//! teach document-database querying, plus a catalog of numbered example
//! requests that run against it. Built on LMDB (Lightning Memory-Mapped
//! Database): every collection is an LMDB database of JSON documents keyed
//! by `_id`.
//!
//! ## Features
//!
//! - **Seed loader**: departments, employees, salary history, products and
//!   customers, loaded in one pass ([`seed::seed_database`])
//! - **Bulk import**: JSON array files for the larger `orders` and `reviews`
//!   datasets ([`seed::import_json_file`])
//! - **Queries**: filters, projections, sorts, updates and aggregation
//!   pipelines evaluated in process ([`query`])
//! - **Catalog**: 32 HR and 50 e-commerce example requests ([`catalog`])
//! - **Safe error handling**: every failure is an [`AppResponse`], no
//!   `unwrap()` calls in library code
//!
//! ## Quick Start
//!
//! ```no_run
//! use sample_docstore::{seed, AppDbState, StoreConfig};
//! use serde_json::json;
//!
//! let db = AppDbState::init(&StoreConfig::new("./data", "kmidbt"))?;
//! seed::seed_database(&db)?;
//!
//! let it = db.collection("employees").find(&json!({"department_id": 60}))?;
//! assert_eq!(it.len(), 5);
//! # Ok::<(), sample_docstore::AppResponse>(())
//! ```

pub mod app_response;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod document;
pub mod local_db_model;
pub mod local_db_state;
pub mod query;
pub mod seed;
mod test;

pub use app_response::{AppResponse, Result};
pub use catalog::{CatalogEntry, Domain, Outcome, Request};
pub use collection::{Collection, DeleteResult, FindOptions, InsertManyResult, InsertOneResult, UpdateResult};
pub use config::StoreConfig;
pub use local_db_model::ToDocument;
pub use local_db_state::{AppDbState, IndexSpec};
