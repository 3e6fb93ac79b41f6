use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

/// Every failure the store, the evaluator and the loaders can report.
///
/// Errors surface as-is: nothing in the crate retries or recovers locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    /// An insert hit an `_id` that already exists in the collection.
    DuplicateKey { collection: String, id: String },
    /// A `$text` query ran against a collection without a text index.
    IndexNotFound(String),
    /// Malformed filter, update, projection, expression or pipeline stage.
    InvalidQuery(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::DuplicateKey { collection, id } => write!(
                f,
                "Duplicate key error: collection '{}' already contains _id {}",
                collection, id
            ),
            AppResponse::IndexNotFound(msg) => write!(f, "Index not found: {}", msg),
            AppResponse::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
        }
    }
}

impl std::error::Error for AppResponse {}

impl From<LmdbError> for AppResponse {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppResponse::NotFound("Key or database not found".to_string()),
            LmdbError::MapFull => {
                AppResponse::DatabaseError("Environment map size reached; raise map_size".to_string())
            }
            LmdbError::DbsFull => AppResponse::DatabaseError(
                "Too many collections; raise max_collections".to_string(),
            ),
            LmdbError::Corrupted => AppResponse::DatabaseError("Database is corrupted".to_string()),
            _ => AppResponse::DatabaseError(format!("LMDB error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<regex::Error> for AppResponse {
    fn from(err: regex::Error) -> Self {
        AppResponse::InvalidQuery(format!("Invalid regular expression: {}", err))
    }
}

impl From<std::io::Error> for AppResponse {
    fn from(err: std::io::Error) -> Self {
        AppResponse::DatabaseError(format!("IO error: {}", err))
    }
}

impl AppResponse {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppResponse::InvalidQuery(msg.into())
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, AppResponse::DuplicateKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, AppResponse>;
