//! bsftp Configuration
//!
//! Configuration is read once at startup from a TOML file, then a small set
//! of environment variables may override individual fields. The resulting
//! value is validated and handed by reference to the session manager and the
//! request handler.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// SSH listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// The single accepted credential pair
    pub auth: AuthConfig,

    /// Object storage backend configuration
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SSH listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Identification string advertised during the SSH handshake
    #[serde(default = "default_server_id")]
    pub server_id: String,

    /// Path to the OpenSSH-format host private key
    #[serde(default)]
    pub host_key_file: Option<PathBuf>,

    /// PEM text of the host private key (normally set from the environment)
    #[serde(default, skip_serializing)]
    pub host_key_pem: Option<String>,

    /// Close connections idle for this many seconds (0 = never)
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,

    /// Delay before answering a failed authentication attempt
    #[serde(default = "default_auth_rejection_time")]
    pub auth_rejection_time_ms: u64,
}

/// Credential pair accepted by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Username
    #[serde(default)]
    pub user: String,

    /// Password
    #[serde(default)]
    pub password: String,
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// S3-compatible service (AWS S3, MinIO, GCS interoperability endpoint)
    S3,
    /// In-process store, contents are lost on exit
    Memory,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Bucket name
    #[serde(default)]
    pub bucket: String,

    /// Region name
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint URL (MinIO, GCS interoperability, ...)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Access key (falls back to the standard AWS environment/profile)
    #[serde(default)]
    pub access_key: Option<String>,

    /// Secret key
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Use path-style bucket addressing
    #[serde(default)]
    pub path_style: bool,

    /// Maximum entries requested per listing page
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,

    /// Maximum entries materialized for a single directory listing
    #[serde(default = "default_max_list_entries")]
    pub max_list_entries: usize,

    /// Bytes pulled from the backend per sequential read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Bytes kept in memory below the highest written offset of an upload
    #[serde(default = "default_write_window")]
    pub write_window_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:3003".to_string()
}

fn default_server_id() -> String {
    "SSH-2.0-BSFTP".to_string()
}

fn default_inactivity_timeout() -> u64 {
    3600
}

fn default_auth_rejection_time() -> u64 {
    1000
}

fn default_backend() -> BackendKind {
    BackendKind::S3
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_list_page_size() -> usize {
    1000
}

fn default_max_list_entries() -> usize {
    100_000
}

fn default_read_chunk_size() -> usize {
    256 * 1024
}

fn default_write_window() -> usize {
    8 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            server_id: default_server_id(),
            host_key_file: None,
            host_key_pem: None,
            inactivity_timeout_secs: default_inactivity_timeout(),
            auth_rejection_time_ms: default_auth_rejection_time(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
            list_page_size: default_list_page_size(),
            max_list_entries: default_max_list_entries(),
            read_chunk_size: default_read_chunk_size(),
            write_window_bytes: default_write_window(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host_key_file: Some(PathBuf::from("/etc/bsftp/host_key")),
                ..ServerConfig::default()
            },
            auth: AuthConfig {
                user: "user".to_string(),
                password: "password".to_string(),
            },
            storage: StorageConfig {
                bucket: "my-bucket".to_string(),
                ..StorageConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file, apply environment overrides
    /// and validate the result
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: GatewayConfig = toml::from_str(&content)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields from the environment. `lookup` returns the value of
    /// a variable if it is set.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(user) = lookup("BSFTP_USER") {
            self.auth.user = user;
        }
        if let Some(password) = lookup("BSFTP_PASSWORD") {
            self.auth.password = password;
        }
        if let Some(pem) = lookup("BSFTP_PRIVATE_KEY") {
            self.server.host_key_pem = Some(pem);
        }
        if let Some(path) = lookup("BSFTP_HOST_KEY_FILE") {
            self.server.host_key_file = Some(PathBuf::from(path));
        }
        if let Some(bucket) = lookup("BSFTP_BUCKET_NAME") {
            self.storage.bucket = bucket;
        }
        if let Some(addr) = lookup("BSFTP_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(Error::Config("server.bind_address cannot be empty".into()));
        }

        if !self.server.server_id.starts_with("SSH-2.0-") {
            return Err(Error::Config(
                "server.server_id must start with \"SSH-2.0-\"".into(),
            ));
        }

        if self.server.host_key_file.is_none() && self.server.host_key_pem.is_none() {
            return Err(Error::Config(
                "a host key is required (server.host_key_file or BSFTP_PRIVATE_KEY)".into(),
            ));
        }

        if self.auth.user.is_empty() {
            return Err(Error::Config("auth.user cannot be empty".into()));
        }

        if self.auth.password.is_empty() {
            return Err(Error::Config("auth.password cannot be empty".into()));
        }

        if self.storage.backend == BackendKind::S3 && self.storage.bucket.is_empty() {
            return Err(Error::Config("storage.bucket cannot be empty".into()));
        }

        if self.storage.list_page_size == 0 {
            return Err(Error::Config("storage.list_page_size must be positive".into()));
        }

        if self.storage.read_chunk_size == 0 {
            return Err(Error::Config("storage.read_chunk_size must be positive".into()));
        }

        if self.storage.write_window_bytes == 0 {
            return Err(Error::Config(
                "storage.write_window_bytes must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Get the inactivity timeout, if enabled
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        match self.server.inactivity_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Get the authentication rejection delay as Duration
    pub fn auth_rejection_time(&self) -> Duration {
        Duration::from_millis(self.server.auth_rejection_time_ms)
    }
}
