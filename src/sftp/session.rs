//! Per-channel SFTP session state

use std::collections::HashMap;

use chrono::Utc;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use russh_sftp::server::Handler;
use tracing::{debug, info, warn};

use super::{file_attributes, READDIR_BATCH};
use crate::error::{Error, Result};
use crate::fs::{
    path, FileCmd, FileList, FileMode, FsHandler, Listing, ReadAtBuffer, Request, RequestContext,
    WriteAtBuffer,
};

/// An open SFTP handle
enum OpenHandle {
    Read {
        path: String,
        buffer: ReadAtBuffer,
    },
    Write {
        path: String,
        buffer: WriteAtBuffer,
    },
    Dir {
        path: String,
        listing: Listing,
        offset: usize,
    },
}

impl OpenHandle {
    fn path(&self) -> &str {
        match self {
            OpenHandle::Read { path, .. }
            | OpenHandle::Write { path, .. }
            | OpenHandle::Dir { path, .. } => path,
        }
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

/// Log a failed request before it is turned into a status reply
fn traced<T>(op: &str, path: &str, result: Result<T>) -> Result<T> {
    if let Err(ref e) = result {
        debug!("{} {} failed: {}", op, path, e);
    }
    result
}

/// SFTP server state for one channel.
///
/// Handles are plain strings from a per-session counter. Write handles still
/// open when the session ends are dropped without committing.
pub struct SftpSession {
    fs: FsHandler,
    ctx: RequestContext,
    user: String,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpSession {
    pub fn new(fs: FsHandler, ctx: RequestContext, user: impl Into<String>) -> Self {
        Self {
            fs,
            ctx,
            user: user.into(),
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn insert_handle(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let id = format!("h{}", self.next_handle);
        self.handles.insert(id.clone(), handle);
        id
    }

    fn handle_mut(&mut self, handle: &str) -> Result<&mut OpenHandle> {
        self.handles
            .get_mut(handle)
            .ok_or_else(|| Error::InvalidHandle(handle.to_string()))
    }
}

async fn stat_path(fs: &FsHandler, ctx: &RequestContext, path: &str) -> Result<FileAttributes> {
    let req = Request::new(path, FileList::Stat, ctx.clone());
    let listing = traced("stat", req.path(), fs.file_list(&req).await)?;
    let entry = listing
        .first()
        .ok_or_else(|| Error::NotExist(req.path().to_string()))?;
    Ok(file_attributes(entry))
}

async fn command(fs: &FsHandler, ctx: &RequestContext, path: &str, method: FileCmd) -> Result<()> {
    let req = Request::new(path, method, ctx.clone());
    traced(method.as_str(), req.path(), fs.file_cmd(&req).await)
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        let unfinished = self
            .handles
            .values()
            .filter(|h| matches!(h, OpenHandle::Write { .. }))
            .count();
        if unfinished > 0 {
            warn!(
                "Discarding {} unfinished upload(s) for user {}",
                unfinished, self.user
            );
        }
        info!(user = %self.user, "session ended");
    }
}

impl Handler for SftpSession {
    type Error = Error;

    fn unimplemented(&self) -> Self::Error {
        Error::NotImplemented("request")
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version> {
        debug!("SFTP init from {} (client version {})", self.user, version);
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name> {
        Ok(Name {
            id,
            files: vec![File::dummy(path::clean_path(&path))],
        })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle> {
        let req = Request::plain(&filename, self.ctx.clone());
        let writing = pflags.intersects(
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::APPEND,
        );

        let handle = if writing {
            let buffer = traced("open", req.path(), self.fs.file_write(&req))?;
            OpenHandle::Write {
                path: req.path().to_string(),
                buffer,
            }
        } else {
            let buffer = traced("open", req.path(), self.fs.file_read(&req).await)?;
            OpenHandle::Read {
                path: req.path().to_string(),
                buffer,
            }
        };

        Ok(Handle {
            id,
            handle: self.insert_handle(handle),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status> {
        let open = self
            .handles
            .remove(&handle)
            .ok_or_else(|| Error::InvalidHandle(handle.clone()))?;

        match open {
            OpenHandle::Read { mut buffer, .. } => buffer.close()?,
            OpenHandle::Write { path, mut buffer } => {
                let result = self.ctx.run(buffer.close()).await;
                traced("close", &path, result)?;
                debug!("Stored {} ({} bytes)", path, buffer.size());
            }
            OpenHandle::Dir { .. } => {}
        }

        Ok(ok_status(id))
    }

    async fn read(&mut self, id: u32, handle: String, offset: u64, len: u32) -> Result<Data> {
        let ctx = self.ctx.clone();
        match self.handle_mut(&handle)? {
            OpenHandle::Read { path, buffer } => {
                let result = ctx.run(buffer.read_at(offset, len as usize)).await;
                if let Err(Error::EndOfData) = result {
                    return Err(Error::EndOfData);
                }
                let data = traced("read", path, result)?;
                Ok(Data {
                    id,
                    data: data.to_vec(),
                })
            }
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    async fn write(&mut self, id: u32, handle: String, offset: u64, data: Vec<u8>) -> Result<Status> {
        let ctx = self.ctx.clone();
        match self.handle_mut(&handle)? {
            OpenHandle::Write { path, buffer } => {
                let result = ctx.run(buffer.write_at(offset, &data)).await;
                traced("write", path, result)?;
                Ok(ok_status(id))
            }
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs> {
        let attrs = stat_path(&self.fs, &self.ctx, &path).await?;
        Ok(Attrs { id, attrs })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs> {
        let attrs = stat_path(&self.fs, &self.ctx, &path).await?;
        Ok(Attrs { id, attrs })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs> {
        let path = match self.handle_mut(&handle)? {
            OpenHandle::Write { buffer, .. } => {
                // not in the bucket yet; report what has been written so far
                let now = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
                let attrs = FileAttributes {
                    size: Some(buffer.size()),
                    permissions: Some(FileMode::file().bits()),
                    atime: Some(now),
                    mtime: Some(now),
                    ..FileAttributes::default()
                };
                return Ok(Attrs { id, attrs });
            }
            other => other.path().to_string(),
        };

        let attrs = stat_path(&self.fs, &self.ctx, &path).await?;
        Ok(Attrs { id, attrs })
    }

    async fn setstat(&mut self, id: u32, path: String, _attrs: FileAttributes) -> Result<Status> {
        command(&self.fs, &self.ctx, &path, FileCmd::SetAttributes).await?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status> {
        let path = self.handle_mut(&handle)?.path().to_string();
        command(&self.fs, &self.ctx, &path, FileCmd::SetAttributes).await?;
        Ok(ok_status(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle> {
        let req = Request::new(&path, FileList::List, self.ctx.clone());
        let listing = traced("opendir", req.path(), self.fs.file_list(&req).await)?;
        debug!("Listed {} ({} entries)", req.path(), listing.len());

        let handle = self.insert_handle(OpenHandle::Dir {
            path: req.path().to_string(),
            listing,
            offset: 0,
        });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name> {
        match self.handle_mut(&handle)? {
            OpenHandle::Dir {
                listing, offset, ..
            } => {
                let batch = listing.list_at(*offset, READDIR_BATCH)?;
                *offset += batch.len();

                let files = batch
                    .iter()
                    .map(|entry| File::new(entry.name(), file_attributes(entry)))
                    .collect();
                Ok(Name { id, files })
            }
            _ => Err(Error::InvalidHandle(handle)),
        }
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status> {
        command(&self.fs, &self.ctx, &filename, FileCmd::Remove).await?;
        Ok(ok_status(id))
    }

    async fn mkdir(&mut self, id: u32, path: String, _attrs: FileAttributes) -> Result<Status> {
        command(&self.fs, &self.ctx, &path, FileCmd::CreateDirectory).await?;
        Ok(ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status> {
        command(&self.fs, &self.ctx, &path, FileCmd::RemoveDirectory).await?;
        Ok(ok_status(id))
    }

    async fn rename(&mut self, id: u32, oldpath: String, _newpath: String) -> Result<Status> {
        command(&self.fs, &self.ctx, &oldpath, FileCmd::Rename).await?;
        Ok(ok_status(id))
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name> {
        let req = Request::new(&path, FileList::Readlink, self.ctx.clone());
        let listing = traced("readlink", req.path(), self.fs.file_list(&req).await)?;
        let files = listing
            .iter()
            .map(|entry| File::new(entry.name(), file_attributes(entry)))
            .collect();
        Ok(Name { id, files })
    }

    async fn symlink(&mut self, id: u32, linkpath: String, _targetpath: String) -> Result<Status> {
        command(&self.fs, &self.ctx, &linkpath, FileCmd::CreateSymlink).await?;
        Ok(ok_status(id))
    }
}
