//! In-process object store
//!
//! Keeps objects in a sorted map and answers delimited listings the way S3
//! and GCS do, so the gateway's directory synthesis behaves identically
//! against it. Used by tests and by `backend = "memory"`.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use super::{ListPage, ListQuery, ObjectAttributes, ObjectReader, ObjectStore, ObjectWriter};
use crate::error::{Error, Result};

/// Stored object contents
#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    updated: DateTime<Utc>,
}

type ObjectMap = Arc<RwLock<BTreeMap<String, StoredObject>>>;

/// In-memory bucket
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    objects: ObjectMap,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty store with a bucket name used in logs
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Store an object, replacing any previous contents
    pub fn insert(&self, key: impl Into<String>, data: Bytes) {
        insert_object(&self.objects, key.into(), data);
    }

    /// Contents of an object, if present
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(key).map(|o| o.data.clone())
    }

    /// All keys in lexicographic order
    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.keys().cloned().collect()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_object(objects: &ObjectMap, key: String, data: Bytes) {
    let mut objects = objects.write().unwrap_or_else(|e| e.into_inner());
    objects.insert(
        key,
        StoredObject {
            data,
            updated: Utc::now(),
        },
    );
}

/// Map a key to its listing row: either the object itself or the common
/// prefix it is grouped under
fn listing_row(key: &str, object: &StoredObject, query: &ListQuery) -> ObjectAttributes {
    let rest = &key[query.prefix.len()..];

    if !query.delimiter.is_empty() {
        if let Some(pos) = rest.find(&query.delimiter) {
            let end = query.prefix.len() + pos + query.delimiter.len();
            return ObjectAttributes::common_prefix(&key[..end]);
        }
    }

    ObjectAttributes::object(key, object.data.len() as u64, object.updated)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open_read(&self, key: &str) -> Result<ObjectReader> {
        match self.get(key) {
            Some(data) => Ok(Box::new(Cursor::new(data))),
            None => Err(Error::NotExist(key.to_string())),
        }
    }

    fn open_write(&self, key: &str) -> Box<dyn ObjectWriter> {
        Box::new(MemoryWriter {
            key: key.to_string(),
            buffer: BytesMut::new(),
            objects: Arc::clone(&self.objects),
        })
    }

    async fn attributes(&self, key: &str) -> Result<ObjectAttributes> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        match objects.get(key) {
            Some(object) => Ok(ObjectAttributes::object(
                key,
                object.data.len() as u64,
                object.updated,
            )),
            None => Err(Error::NotExist(key.to_string())),
        }
    }

    async fn list_page(&self, query: &ListQuery, token: Option<String>) -> Result<ListPage> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let range = objects.range::<str, _>((Bound::Included(query.prefix.as_str()), Bound::Unbounded));

        let mut entries: Vec<ObjectAttributes> = Vec::new();
        let mut more = false;

        for (key, object) in range {
            if !key.starts_with(&query.prefix) {
                break;
            }

            let row = listing_row(key, object, query);

            // Rows are produced in non-decreasing sort-key order, so the token
            // (last row of the previous page) skips everything already returned
            if let Some(token) = token.as_deref() {
                if row.sort_key() <= token {
                    continue;
                }
            }

            // Consecutive keys under the same common prefix collapse into one row
            if let Some(last) = entries.last() {
                if last.sort_key() == row.sort_key() {
                    continue;
                }
            }

            if entries.len() == query.page_size {
                more = true;
                break;
            }
            entries.push(row);
        }

        let next = if more {
            entries.last().map(|e| e.sort_key().to_string())
        } else {
            None
        };

        Ok(ListPage { entries, next })
    }

    fn describe(&self) -> String {
        format!("memory bucket {}", self.name)
    }
}

/// Buffers an upload and publishes it on close
struct MemoryWriter {
    key: String,
    buffer: BytesMut,
    objects: ObjectMap,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let MemoryWriter {
            key,
            buffer,
            objects,
        } = *self;
        insert_object(&objects, key, buffer.freeze());
        Ok(())
    }
}
