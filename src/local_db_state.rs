//! LMDB-backed storage for document collections.
//!
//! One LMDB environment holds one database. Every collection is a named
//! LMDB database keyed by the encoded `_id`; documents are stored as JSON.
//! Index definitions live in a separate `_meta` database keyed by collection
//! name.

use std::fs;
use std::path::{Path, PathBuf};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Error as LmdbError, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app_response::{AppResponse, Result};
use crate::config::StoreConfig;
use crate::document::{display_id, ID_FIELD};

const META_DB: &str = "_meta";

const INT_KEY_TAG: u8 = b'n';
const JSON_KEY_TAG: u8 = b'j';

/// A declared index. `keys` keeps the original key document, e.g.
/// `{"name": "text", "description": "text"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Value,
}

impl IndexSpec {
    pub fn is_text(&self) -> bool {
        self.keys
            .as_object()
            .map(|keys| keys.values().any(|kind| kind == "text"))
            .unwrap_or(false)
    }

    /// Fields covered by the text part of the index.
    pub fn text_fields(&self) -> Vec<String> {
        self.keys
            .as_object()
            .map(|keys| {
                keys.iter()
                    .filter(|(_, kind)| *kind == "text")
                    .map(|(field, _)| field.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Encodes an `_id` into an LMDB key.
///
/// Integral ids become a tag byte plus the sign-flipped big-endian value so
/// that cursor order equals numeric order; everything else is tagged JSON.
pub fn document_key(id: &Value) -> Result<Vec<u8>> {
    let integral = match id {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    };

    match (integral, id) {
        (Some(i), _) => {
            let mut key = Vec::with_capacity(9);
            key.push(INT_KEY_TAG);
            key.extend_from_slice(&((i as u64) ^ (1u64 << 63)).to_be_bytes());
            Ok(key)
        }
        (None, Value::Array(_)) => Err(AppResponse::ValidationError(
            "_id cannot be an array".to_string(),
        )),
        (None, other) => {
            let mut key = vec![JSON_KEY_TAG];
            key.extend(serde_json::to_vec(other)?);
            Ok(key)
        }
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppResponse::ValidationError(
            "collection name cannot be empty".to_string(),
        ));
    }
    if name.starts_with('_') || name.contains('$') || name.contains('\0') {
        return Err(AppResponse::ValidationError(format!(
            "invalid collection name '{}'",
            name
        )));
    }
    Ok(())
}

pub struct AppDbState {
    env: Environment,
    path: PathBuf,
    name: String,
}

impl AppDbState {
    /// Opens (creating if needed) the environment at
    /// `<data_dir>/<database>.lmdb`.
    pub fn init(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = config.environment_path();

        if path.exists() {
            info!("Opening existing database at: {}", path.display());
        } else {
            info!("Creating new database at: {}", path.display());
            fs::create_dir_all(&path)?;
        }

        // One extra slot for the metadata database.
        let env = Environment::new()
            .set_max_dbs(config.max_collections + 1)
            .set_map_size(config.map_size)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to open LMDB environment at {}: {}", path.display(), e);
                AppResponse::from(e)
            })?;

        Ok(Self {
            env,
            path,
            name: config.database.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_existing(&self, collection: &str) -> Result<Option<Database>> {
        validate_collection_name(collection)?;
        match self.env.open_db(Some(collection)) {
            Ok(db) => Ok(Some(db)),
            Err(LmdbError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open_or_create(&self, collection: &str) -> Result<Database> {
        validate_collection_name(collection)?;
        Ok(self.env.create_db(Some(collection), DatabaseFlags::empty())?)
    }

    fn meta_db(&self) -> Result<Database> {
        Ok(self.env.create_db(Some(META_DB), DatabaseFlags::empty())?)
    }

    /// Every document in `collection`, in key order. A collection that was
    /// never written to reads as empty.
    pub fn documents(&self, collection: &str) -> Result<Vec<Value>> {
        let Some(db) = self.open_existing(collection)? else {
            return Ok(Vec::new());
        };

        let txn = self.env.begin_ro_txn()?;
        let mut documents = Vec::new();
        {
            // `iter_start` panics on an empty database; `iter` does not.
            let mut cursor = txn.open_ro_cursor(db)?;
            for (_, bytes) in cursor.iter() {
                documents.push(serde_json::from_slice(bytes)?);
            }
        }
        txn.abort();

        debug!("Scanned {} documents from '{}'", documents.len(), collection);
        Ok(documents)
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let Some(db) = self.open_existing(collection)? else {
            return Ok(0);
        };

        let txn = self.env.begin_ro_txn()?;
        let count = {
            let mut cursor = txn.open_ro_cursor(db)?;
            cursor.iter().count()
        };
        txn.abort();
        Ok(count)
    }

    pub fn get_by_id(&self, collection: &str, id: &Value) -> Result<Option<Value>> {
        let Some(db) = self.open_existing(collection)? else {
            return Ok(None);
        };
        let key = document_key(id)?;

        let txn = self.env.begin_ro_txn()?;
        let found = match txn.get(db, &key) {
            Ok(bytes) => Some(serde_json::from_slice(bytes)?),
            Err(LmdbError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(found)
    }

    /// Inserts documents in a single write transaction. Any existing `_id`
    /// aborts the whole batch with [`AppResponse::DuplicateKey`].
    pub fn insert_documents(&self, collection: &str, documents: &[Value]) -> Result<usize> {
        self.write_documents(collection, documents, WriteFlags::NO_OVERWRITE)
    }

    /// Writes documents over whatever is stored under their `_id`.
    pub fn put_documents(&self, collection: &str, documents: &[Value]) -> Result<usize> {
        self.write_documents(collection, documents, WriteFlags::empty())
    }

    fn write_documents(
        &self,
        collection: &str,
        documents: &[Value],
        flags: WriteFlags,
    ) -> Result<usize> {
        let db = self.open_or_create(collection)?;

        let mut encoded = Vec::with_capacity(documents.len());
        for doc in documents {
            let id = doc.get(ID_FIELD).ok_or_else(|| {
                AppResponse::ValidationError(format!(
                    "document written to '{}' has no _id",
                    collection
                ))
            })?;
            encoded.push((id, document_key(id)?, serde_json::to_vec(doc)?));
        }

        let mut txn = self.env.begin_rw_txn()?;
        for (id, key, bytes) in &encoded {
            match txn.put(db, key, bytes, flags) {
                Ok(()) => {}
                Err(LmdbError::KeyExist) => {
                    txn.abort();
                    warn!(
                        "Duplicate _id {} in '{}'; batch rolled back",
                        display_id(id),
                        collection
                    );
                    return Err(AppResponse::DuplicateKey {
                        collection: collection.to_string(),
                        id: display_id(id),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        txn.commit()?;

        debug!("Wrote {} documents to '{}'", encoded.len(), collection);
        Ok(encoded.len())
    }

    /// Deletes the documents with the given ids; returns how many existed.
    pub fn delete_by_ids(&self, collection: &str, ids: &[Value]) -> Result<usize> {
        let Some(db) = self.open_existing(collection)? else {
            return Ok(0);
        };

        let keys = ids.iter().map(document_key).collect::<Result<Vec<_>>>()?;

        let mut txn = self.env.begin_rw_txn()?;
        let mut deleted = 0;
        for key in &keys {
            match txn.del(db, key, None) {
                Ok(()) => deleted += 1,
                Err(LmdbError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        txn.commit()?;
        Ok(deleted)
    }

    /// Removes every document from `collection`, keeping the collection.
    pub fn clear_all_records(&self, collection: &str) -> Result<usize> {
        let count = self.count(collection)?;
        let Some(db) = self.open_existing(collection)? else {
            return Ok(0);
        };

        let mut txn = self.env.begin_rw_txn()?;
        txn.clear_db(db)?;
        txn.commit()?;

        info!("Cleared {} records from '{}'", count, collection);
        Ok(count)
    }

    /// Names of every collection that has been created, sorted.
    pub fn collection_names(&self) -> Result<Vec<String>> {
        let main = self.env.open_db(None)?;
        let txn = self.env.begin_ro_txn()?;
        let mut names = Vec::new();
        {
            let mut cursor = txn.open_ro_cursor(main)?;
            for (key, _) in cursor.iter() {
                match std::str::from_utf8(key) {
                    Ok(name) if name != META_DB => names.push(name.to_string()),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping non UTF-8 database name: {}", e),
                }
            }
        }
        txn.abort();
        Ok(names)
    }

    pub fn index_specs(&self, collection: &str) -> Result<Vec<IndexSpec>> {
        let meta = self.meta_db()?;
        let txn = self.env.begin_ro_txn()?;
        let specs = match txn.get(meta, &collection.as_bytes()) {
            Ok(bytes) => serde_json::from_slice(bytes)?,
            Err(LmdbError::NotFound) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(specs)
    }

    pub fn save_index_specs(&self, collection: &str, specs: &[IndexSpec]) -> Result<()> {
        validate_collection_name(collection)?;
        let meta = self.meta_db()?;
        let bytes = serde_json::to_vec(specs)?;

        let mut txn = self.env.begin_rw_txn()?;
        txn.put(meta, &collection.as_bytes(), &bytes, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    /// Empties every collection and forgets every index definition.
    pub fn reset_database(&self) -> Result<()> {
        let mut databases = Vec::new();
        for name in self.collection_names()? {
            if let Some(db) = self.open_existing(&name)? {
                databases.push(db);
            }
        }
        databases.push(self.meta_db()?);

        let mut txn = self.env.begin_rw_txn()?;
        for db in databases {
            txn.clear_db(db)?;
        }
        txn.commit()?;

        info!("Database '{}' was reset", self.name);
        Ok(())
    }

    /// Flushes to disk and releases the environment.
    pub fn close_database(self) -> Result<()> {
        self.env.sync(true)?;
        info!("Database '{}' closed", self.name);
        Ok(())
    }
}
