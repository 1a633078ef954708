//! bsftp - SFTP Gateway for Object Storage
//!
//! Exposes a single object storage bucket as a hierarchical filesystem over
//! SFTP. Clients authenticate with one shared username/password pair and can
//! upload, download, list and stat files and create directories.
//!
//! # Architecture
//!
//! Each accepted SSH connection runs on its own task. Every session channel
//! that requests the `sftp` subsystem gets an [`sftp::SftpSession`], which
//! turns protocol packets into [`fs::FsHandler`] requests. The handler maps
//! them onto an [`storage::ObjectStore`]:
//!
//! - directories are synthesized from delimited listings and zero-byte
//!   marker objects whose key ends in `/`
//! - random-access reads and writes are buffered over sequential object
//!   streams
//! - rename, delete and links are not supported
//!
//! # Backends
//!
//! - S3-compatible services (AWS S3, MinIO, GCS interoperability endpoint)
//! - an in-process memory store for tests and demos

pub mod config;
pub mod error;
pub mod fs;
pub mod sftp;
pub mod ssh;
pub mod storage;

pub use config::GatewayConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::error::{Error, Result};
    pub use crate::fs::{FileCmd, FileList, FsHandler, HandlerSettings, Request, RequestContext};
    pub use crate::fs::{Listing, ReadAtBuffer, SyntheticFileInfo, WriteAtBuffer};
    pub use crate::ssh::SessionManager;
    pub use crate::storage::{MemoryStore, ObjectStore, S3Store};
}
