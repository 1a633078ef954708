//! SSH session management
//!
//! Password authentication against the configured credential pair, channel
//! and subsystem filtering, and the TCP accept loop.

pub mod auth;
pub mod server;

pub use auth::Credentials;
pub use server::{encode_host_key, generate_host_key, load_host_key, SessionManager};
