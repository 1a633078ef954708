//! Filesystem request handler
//!
//! Maps the four SFTP request groups (read, write, command, list) onto
//! object store calls. Directories are reconstructed from two conventions:
//! zero-byte marker objects whose key ends with `/`, and the common
//! prefixes returned by delimited listings.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::context::RequestContext;
use super::info::{Listing, SyntheticFileInfo};
use super::path;
use super::stream::{ReadAtBuffer, WriteAtBuffer};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::storage::{self, ListQuery, ObjectAttributes, ObjectStore, DELIMITER};

/// Command request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCmd {
    /// Accepted and ignored; attributes are not stored in the bucket
    SetAttributes,
    Rename,
    RemoveDirectory,
    Remove,
    CreateSymlink,
    /// Writes a zero-byte marker object
    CreateDirectory,
}

impl FileCmd {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCmd::SetAttributes => "setstat",
            FileCmd::Rename => "rename",
            FileCmd::RemoveDirectory => "rmdir",
            FileCmd::Remove => "remove",
            FileCmd::CreateSymlink => "symlink",
            FileCmd::CreateDirectory => "mkdir",
        }
    }
}

impl fmt::Display for FileCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileList {
    List,
    Stat,
    Readlink,
}

impl FileList {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileList::List => "list",
            FileList::Stat => "stat",
            FileList::Readlink => "readlink",
        }
    }
}

impl fmt::Display for FileList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem request: a cleaned path, a method tag and the context
/// backend calls run under
#[derive(Debug, Clone)]
pub struct Request<M = ()> {
    path: String,
    method: M,
    ctx: RequestContext,
}

impl<M> Request<M> {
    /// Build a request, cleaning the client-supplied path
    pub fn new(path: &str, method: M, ctx: RequestContext) -> Self {
        Self {
            path: path::clean_path(path),
            method,
            ctx,
        }
    }

    /// Cleaned absolute path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Object key addressed by this request
    pub fn key(&self) -> &str {
        path::object_key(&self.path)
    }
}

impl Request<()> {
    /// Request without a method tag, used for reads and writes
    pub fn plain(path: &str, ctx: RequestContext) -> Self {
        Self::new(path, (), ctx)
    }
}

/// Tunables of the request handler
#[derive(Debug, Clone, Copy)]
pub struct HandlerSettings {
    pub list_page_size: usize,
    pub max_list_entries: usize,
    pub read_chunk_size: usize,
    pub write_window_bytes: usize,
}

impl From<&StorageConfig> for HandlerSettings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            list_page_size: config.list_page_size,
            max_list_entries: config.max_list_entries,
            read_chunk_size: config.read_chunk_size,
            write_window_bytes: config.write_window_bytes,
        }
    }
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

/// Filesystem view over one bucket, shared by every session
#[derive(Clone)]
pub struct FsHandler {
    store: Arc<dyn ObjectStore>,
    settings: HandlerSettings,
}

impl FsHandler {
    pub fn new(store: Arc<dyn ObjectStore>, settings: HandlerSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Open the object at the request path for random-access reading
    pub async fn file_read(&self, req: &Request) -> Result<ReadAtBuffer> {
        let key = req.key();
        let reader = req.context().run(self.store.open_read(key)).await?;
        debug!("Opened {} for reading", key);
        Ok(ReadAtBuffer::new(reader, self.settings.read_chunk_size))
    }

    /// Open the object at the request path for random-access writing.
    ///
    /// The object only exists once the returned buffer is closed.
    pub fn file_write(&self, req: &Request) -> Result<WriteAtBuffer> {
        if path::is_root(req.path()) {
            return Err(Error::InvalidPath(req.path().to_string()));
        }

        let key = req.key();
        debug!("Opened {} for writing", key);
        Ok(WriteAtBuffer::new(
            self.store.open_write(key),
            &[],
            self.settings.write_window_bytes,
        ))
    }

    /// Execute a command request
    pub async fn file_cmd(&self, req: &Request<FileCmd>) -> Result<()> {
        match req.method() {
            FileCmd::SetAttributes => Ok(()),
            method @ (FileCmd::Rename
            | FileCmd::RemoveDirectory
            | FileCmd::Remove
            | FileCmd::CreateSymlink) => Err(Error::NotImplemented(method.as_str())),
            FileCmd::CreateDirectory => {
                if path::is_root(req.path()) {
                    return Err(Error::InvalidPath(req.path().to_string()));
                }

                let marker = path::marker_key(req.path());
                let writer = self.store.open_write(&marker);
                req.context().run(writer.close()).await?;
                debug!("Created directory marker {}", marker);
                Ok(())
            }
        }
    }

    /// Execute a listing request
    pub async fn file_list(&self, req: &Request<FileList>) -> Result<Listing> {
        match req.method() {
            FileList::List => self.list(req).await,
            FileList::Stat => self.stat(req).await,
            FileList::Readlink => Err(Error::NotImplemented(FileList::Readlink.as_str())),
        }
    }

    async fn list(&self, req: &Request<FileList>) -> Result<Listing> {
        let prefix = path::listing_prefix(req.path());
        let query = ListQuery {
            prefix: prefix.clone(),
            delimiter: DELIMITER.to_string(),
            page_size: self.settings.list_page_size,
        };

        let (rows, truncated) = req
            .context()
            .run(storage::list_all(
                self.store.as_ref(),
                &query,
                self.settings.max_list_entries,
            ))
            .await?;

        if truncated {
            warn!(
                "Listing of {} truncated to {} entries",
                req.path(),
                self.settings.max_list_entries
            );
        }

        let entries = rows
            .into_iter()
            .filter(|attrs| !refers_to_prefix(&prefix, attrs))
            .map(|attrs| SyntheticFileInfo::new(prefix.clone(), attrs))
            .collect();

        Ok(Listing::new(entries))
    }

    async fn stat(&self, req: &Request<FileList>) -> Result<Listing> {
        if path::is_root(req.path()) {
            return Ok(Listing::single(SyntheticFileInfo::root()));
        }

        let key = req.key();
        let ctx = req.context();

        let attrs = match ctx.run(self.store.attributes(key)).await {
            Ok(attrs) => attrs,
            Err(e) if e.is_not_exist() => {
                let marker = path::marker_key(req.path());
                match ctx.run(self.store.attributes(&marker)).await {
                    Ok(attrs) => attrs,
                    Err(e) if e.is_not_exist() => self.implicit_directory(ctx, &marker, key).await?,
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        Ok(Listing::single(SyntheticFileInfo::new(
            path::parent_prefix(key),
            attrs,
        )))
    }

    /// Resolve a directory that exists only as the common prefix of its
    /// children
    async fn implicit_directory(
        &self,
        ctx: &RequestContext,
        prefix: &str,
        key: &str,
    ) -> Result<ObjectAttributes> {
        let query = ListQuery {
            prefix: prefix.to_string(),
            delimiter: DELIMITER.to_string(),
            page_size: 1,
        };

        let page = ctx.run(self.store.list_page(&query, None)).await?;
        if page.entries.is_empty() {
            Err(Error::NotExist(key.to_string()))
        } else {
            Ok(ObjectAttributes::common_prefix(prefix))
        }
    }
}

/// Whether a listing row is the listed directory itself: its own common
/// prefix, its marker object, or the empty root self-reference
fn refers_to_prefix(prefix: &str, attrs: &ObjectAttributes) -> bool {
    (!prefix.is_empty() && attrs.prefix == prefix)
        || (attrs.prefix.is_empty() && attrs.name == prefix)
}
