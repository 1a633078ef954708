//! SFTP v3 protocol binding
//!
//! One [`SftpSession`] is created per accepted `sftp` subsystem request and
//! driven by `russh_sftp::server::run`. It owns the session's open handles
//! and translates protocol packets into [`crate::fs::FsHandler`] requests.

pub mod session;

use russh_sftp::protocol::FileAttributes;

use crate::fs::SyntheticFileInfo;

pub use session::SftpSession;

/// Subsystem name clients request to start SFTP
pub const SUBSYSTEM_NAME: &str = "sftp";

/// Directory entries returned per READDIR packet
pub const READDIR_BATCH: usize = 128;

/// Wire attributes for a synthetic file entry
pub fn file_attributes(entry: &SyntheticFileInfo) -> FileAttributes {
    let mtime = entry.mod_time().timestamp().clamp(0, u32::MAX as i64) as u32;

    FileAttributes {
        size: Some(entry.size()),
        uid: Some(0),
        user: None,
        gid: Some(0),
        group: None,
        permissions: Some(entry.mode().bits()),
        atime: Some(mtime),
        mtime: Some(mtime),
    }
}
