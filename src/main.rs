//! bsftp - SFTP gateway for object storage buckets
//!
//! Serves one bucket over SFTP, presenting its flat key space as a
//! directory tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bsftp::config::{BackendKind, GatewayConfig, StorageConfig};
use bsftp::error::{Error, Result};
use bsftp::fs::{FsHandler, HandlerSettings};
use bsftp::ssh::{self, SessionManager};
use bsftp::storage::{ListQuery, MemoryStore, ObjectStore, S3Store, DELIMITER};

/// bsftp - SFTP gateway for object storage buckets
#[derive(Parser)]
#[command(name = "bsftp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bsftp.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the
    /// configured level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "bsftp.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Generate an Ed25519 host key
    Keygen {
        /// Output path for the private key
        #[arg(short, long)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| configured_level(&cli.config));
    init_logging(&level);

    match cli.command {
        Commands::Serve => run_serve(cli.config).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Keygen { output, force } => run_keygen(output, force),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log level from the configuration file, if it can be read
fn configured_level(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<GatewayConfig>(&content).ok())
        .map(|config| config.logging.level)
        .unwrap_or_else(|| "info".to_string())
}

/// Build the configured object store
fn build_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        BackendKind::S3 => Ok(Arc::new(S3Store::from_config(config)?)),
        BackendKind::Memory => {
            tracing::warn!("Using the in-memory backend; uploads are lost on exit");
            let name = if config.bucket.is_empty() {
                "memory"
            } else {
                config.bucket.as_str()
            };
            Ok(Arc::new(MemoryStore::named(name)))
        }
    }
}

/// Make one listing call so an unreachable bucket fails startup
async fn check_backend(store: &dyn ObjectStore) -> Result<()> {
    let query = ListQuery {
        prefix: String::new(),
        delimiter: DELIMITER.to_string(),
        page_size: 1,
    };
    store.list_page(&query, None).await?;
    Ok(())
}

/// Start the gateway
async fn run_serve(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting bsftp...");

    let config = match GatewayConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };

    let store = build_store(&config.storage)?;
    if let Err(e) = check_backend(store.as_ref()).await {
        tracing::error!("Cannot reach {}: {}", store.describe(), e);
        return Err(e);
    }
    tracing::info!("Serving {}", store.describe());

    let fs = FsHandler::new(store, HandlerSettings::from(&config.storage));
    let manager = SessionManager::new(&config, fs)?;
    let listener = manager.bind().await?;

    tokio::select! {
        result = manager.serve(listener) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            manager.stop();
        }
    }

    tracing::info!("bsftp shutdown complete");
    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!(
            "{} already exists",
            output.display()
        )));
    }

    GatewayConfig::default().save(&output)?;

    println!("Configuration file created: {:?}", output);
    println!();
    println!("Next steps:");
    println!("  1. Generate a host key: bsftp keygen --output /etc/bsftp/host_key");
    println!("  2. Edit {:?} and set the bucket and credentials", output);
    println!("  3. Start the gateway: bsftp --config {:?} serve", output);

    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match GatewayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  Server ID: {}", config.server.server_id);
            println!("  User: {}", config.auth.user);
            println!(
                "  Backend: {:?} ({})",
                config.storage.backend, config.storage.bucket
            );
            if let Err(e) = ssh::load_host_key(&config.server) {
                eprintln!("✗ Host key error: {}", e);
                return Err(e);
            }
            println!("  Host Key: ok");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Generate a host key
fn run_keygen(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }

    let key = ssh::generate_host_key()?;
    let pem = ssh::encode_host_key(&key)?;
    std::fs::write(&output, pem)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("Host key written to {:?}", output);
    Ok(())
}
