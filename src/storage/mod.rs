//! Object storage backend boundary
//!
//! The gateway consumes a flat, key-addressed blob store through the
//! [`ObjectStore`] trait:
//! - sequential read streams ([`ObjectReader`])
//! - sequential write streams committed on close ([`ObjectWriter`])
//! - attribute lookups that distinguish "does not exist" from other failures
//! - paged listings scoped by a prefix and grouped by a delimiter

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::s3::S3Store;

/// Delimiter used to emulate one level of directory structure
pub const DELIMITER: &str = "/";

/// Sequential read stream over one object
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Backend-reported metadata for one listing entry or one object.
///
/// Exactly one of `name` and `prefix` is non-empty: `prefix` is set for the
/// "common prefix" rows of a delimited listing, `name` for real objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Object key, empty for common-prefix rows
    pub name: String,
    /// Common prefix, empty for real objects
    pub prefix: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub updated: DateTime<Utc>,
}

impl ObjectAttributes {
    /// Attributes of a real object
    pub fn object(name: impl Into<String>, size: u64, updated: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            size,
            updated,
        }
    }

    /// Attributes of a common-prefix row
    pub fn common_prefix(prefix: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            prefix: prefix.into(),
            size: 0,
            updated: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
        }
    }

    /// Key this row sorts by in a listing
    pub fn sort_key(&self) -> &str {
        if self.prefix.is_empty() {
            &self.name
        } else {
            &self.prefix
        }
    }
}

/// Parameters of a delimited listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Only keys starting with this prefix are returned
    pub prefix: String,
    /// Keys are grouped into common prefixes up to the next delimiter
    pub delimiter: String,
    /// Maximum rows per page
    pub page_size: usize,
}

/// One page of a delimited listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Rows in backend order
    pub entries: Vec<ObjectAttributes>,
    /// Token for the following page, `None` on the last page
    pub next: Option<String>,
}

/// Sequential write stream for one object.
///
/// The object is only guaranteed to exist in the backend once
/// [`ObjectWriter::close`] returned successfully. Dropping a writer without
/// closing it discards the upload.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append bytes to the object
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Finish the upload and commit the object
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A single bucket of an object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a sequential read stream on `key`
    async fn open_read(&self, key: &str) -> Result<ObjectReader>;

    /// Open a sequential write stream on `key`. Never fails up front; backend
    /// failures surface on write or close.
    fn open_write(&self, key: &str) -> Box<dyn ObjectWriter>;

    /// Fetch attributes of `key`, failing with `Error::NotExist` if absent
    async fn attributes(&self, key: &str) -> Result<ObjectAttributes>;

    /// Fetch one page of a delimited listing
    async fn list_page(&self, query: &ListQuery, token: Option<String>) -> Result<ListPage>;

    /// Human-readable description of the bucket, for logging
    fn describe(&self) -> String;
}

/// Drain a paged listing into memory, stopping after `limit` rows.
///
/// Returns the rows and whether the listing was cut short.
pub async fn list_all(
    store: &dyn ObjectStore,
    query: &ListQuery,
    limit: usize,
) -> Result<(Vec<ObjectAttributes>, bool)> {
    let mut entries = Vec::new();
    let mut token = None;

    loop {
        let page = store.list_page(query, token).await?;
        for entry in page.entries {
            if entries.len() >= limit {
                return Ok((entries, true));
            }
            entries.push(entry);
        }

        match page.next {
            Some(next) => token = Some(next),
            None => return Ok((entries, false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(prefix: &str, page_size: usize) -> ListQuery {
        ListQuery {
            prefix: prefix.to_string(),
            delimiter: DELIMITER.to_string(),
            page_size,
        }
    }

    #[tokio::test]
    async fn test_list_all_drains_every_page() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store.insert(format!("f{}.txt", i), Bytes::from_static(b"x"));
        }

        let (entries, truncated) = list_all(&store, &query("", 2), 100).await.unwrap();
        assert_eq!(entries.len(), 7);
        assert!(!truncated);
        assert_eq!(entries[0].name, "f0.txt");
        assert_eq!(entries[6].name, "f6.txt");
    }

    #[tokio::test]
    async fn test_list_all_respects_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert(format!("f{}", i), Bytes::new());
        }

        let (entries, truncated) = list_all(&store, &query("", 2), 3).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(truncated);
    }

    #[test]
    fn test_sort_key() {
        let now = Utc::now();
        assert_eq!(ObjectAttributes::object("a.txt", 1, now).sort_key(), "a.txt");
        assert_eq!(ObjectAttributes::common_prefix("dir/").sort_key(), "dir/");
    }
}
