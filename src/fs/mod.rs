//! Filesystem emulation over a flat bucket
//!
//! Protocol-agnostic layer between the SFTP session and the object store:
//! path and key conventions, synthetic file metadata, random-access stream
//! adapters and the request handler that ties them together.

pub mod context;
pub mod handler;
pub mod info;
pub mod path;
pub mod stream;

pub use context::RequestContext;
pub use handler::{FileCmd, FileList, FsHandler, HandlerSettings, Request};
pub use info::{FileMode, Listing, SyntheticFileInfo};
pub use stream::{ReadAtBuffer, WriteAtBuffer};
