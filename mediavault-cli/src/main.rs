//! mediavault CLI
//!
//! Command-line interface for inspecting and maintaining the credentials of
//! the mediavault media-server client.
//!
//! # Usage
//!
//! ```bash
//! # Move secrets left in the shared preferences into the OS keyring
//! mediavault migrate
//!
//! # List signed-in accounts (never prints secrets)
//! mediavault list-users
//!
//! # Add an account, reading its token from stdin
//! echo "$TOKEN" | mediavault add-user 3f1c9a ada@example.com https://photos.example.com
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use mediavault_core::migration::SECRET_MIGRATION_KEY;
use mediavault_core::{
    create_secret_store, open_repository, AuthType, CredentialRepository, FileKeyValueStore,
    KeyValueStore, MigrationCoordinator, PreferenceStore, Secret, SecretStore, StoreError,
    UserId, UserRecord,
};

mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "mediavault")]
#[command(about = "Credential storage for the mediavault media-server client")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move secrets out of the shared preferences into the keyring
    Migrate,

    /// Show storage mode, migration state and account count
    Status,

    /// List stored accounts
    ListUsers {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Store an account and its secret
    AddUser {
        /// Server-assigned user id
        id: String,

        /// Account email
        email: String,

        /// Media server base URL
        server_url: String,

        /// How the secret is presented to the server
        #[arg(short, long, value_enum, default_value_t = AuthKind::Token)]
        auth_type: AuthKind,

        /// Read the secret from this environment variable instead of stdin
        #[arg(long)]
        secret_env: Option<String>,
    },

    /// Remove an account and its secret
    RemoveUser {
        /// User id
        id: String,
    },

    /// Remove every account and secret
    Clear {
        /// Required to confirm
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum AuthKind {
    Token,
    ApiKey,
}

impl From<AuthKind> for AuthType {
    fn from(kind: AuthKind) -> Self {
        match kind {
            AuthKind::Token => AuthType::Token,
            AuthKind::ApiKey => AuthType::ApiKey,
        }
    }
}

/// What `list-users` prints for one account.
#[derive(Serialize)]
struct UserSummary {
    id: String,
    email: String,
    server_url: String,
    auth_type: AuthType,
    created_at: chrono::DateTime<chrono::Utc>,
    has_secret: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    init_logging(&config, cli.verbose);
    info!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::Migrate => migrate(&config).await,
        Commands::Status => status(&config).await,
        Commands::ListUsers { format } => list_users(&config, format).await,
        Commands::AddUser {
            id,
            email,
            server_url,
            auth_type,
            secret_env,
        } => add_user(&config, id, email, &server_url, auth_type.into(), secret_env.as_deref()).await,
        Commands::RemoveUser { id } => remove_user(&config, &id).await,
        Commands::Clear { force } => clear(&config, force).await,
    }
}

fn init_logging(config: &CliConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_preferences(config: &CliConfig) -> Result<Arc<PreferenceStore>> {
    let shared = FileKeyValueStore::open(config.shared_preferences_path())
        .context("Failed to open shared preferences")?;

    let legacy = match config.legacy_preferences_path() {
        Some(path) if path.exists() => {
            let store = FileKeyValueStore::open(&path)
                .with_context(|| format!("Failed to open legacy preferences at {:?}", path))?;
            Some(Arc::new(store) as Arc<dyn KeyValueStore>)
        }
        _ => None,
    };

    Ok(Arc::new(PreferenceStore::open(Arc::new(shared), legacy)))
}

fn secure_store(config: &CliConfig) -> Result<Arc<dyn SecretStore>, StoreError> {
    create_secret_store(&config.keyring_service, config.prefer_keyring)
}

async fn open(config: &CliConfig) -> Result<CredentialRepository> {
    let preferences = open_preferences(config)?;
    Ok(open_repository(preferences, secure_store(config)).await)
}

async fn migrate(config: &CliConfig) -> Result<()> {
    let preferences = open_preferences(config)?;
    let secure = secure_store(config).context("Secure secret store unavailable")?;

    let report = MigrationCoordinator::new(preferences, secure)
        .run()
        .await
        .context("Secret migration failed")?;

    println!("Migration {}", report.outcome);
    println!("  Migrated: {}", report.migrated.len());
    println!("  Verified: {}", report.verified.len());
    println!("  Kept existing: {}", report.kept.len());
    println!("  Legacy secrets removed: {}", report.purged);
    for failure in &report.failures {
        println!("  Failed {}: {}", failure.user_id, failure.error);
    }

    if !report.is_complete() {
        bail!("Secret migration incomplete; legacy secrets were kept and the next run will retry");
    }
    Ok(())
}

async fn status(config: &CliConfig) -> Result<()> {
    let repository = open(config).await?;
    let migrated = repository
        .preferences()
        .setting::<bool>(SECRET_MIGRATION_KEY)?
        .unwrap_or(false);
    let users = repository.load_users().await?;

    println!("Storage mode: {}", repository.storage_mode());
    println!("Secret migration complete: {}", migrated);
    println!("Accounts: {}", users.len());
    println!("Shared preferences: {:?}", config.shared_preferences_path());
    Ok(())
}

async fn list_users(config: &CliConfig, format: Format) -> Result<()> {
    let repository = open(config).await?;
    let users = repository.load_users().await?;

    let mut summaries = Vec::with_capacity(users.len());
    for user in users {
        let has_secret = repository.get_secret(&user.id).await?.is_some();
        summaries.push(UserSummary {
            id: user.id.to_string(),
            email: user.email,
            server_url: user.server_url.to_string(),
            auth_type: user.auth_type,
            created_at: user.created_at,
            has_secret,
        });
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        Format::Text => {
            if summaries.is_empty() {
                println!("No accounts configured");
            }
            for s in &summaries {
                println!(
                    "{}  {}  {}  {}  {}{}",
                    s.id,
                    s.email,
                    s.server_url,
                    s.auth_type,
                    s.created_at.format("%Y-%m-%d %H:%M"),
                    if s.has_secret { "" } else { "  (no secret)" }
                );
            }
        }
    }
    Ok(())
}

fn read_secret(secret_env: Option<&str>) -> Result<Secret> {
    let value = match secret_env {
        Some(var) => std::env::var(var).with_context(|| format!("{} is not set", var))?,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read secret from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if value.is_empty() {
        bail!("Secret must not be empty");
    }
    Ok(Secret::new(value))
}

async fn add_user(
    config: &CliConfig,
    id: String,
    email: String,
    server_url: &str,
    auth_type: AuthType,
    secret_env: Option<&str>,
) -> Result<()> {
    let server_url = url::Url::parse(server_url)
        .with_context(|| format!("Invalid server URL: {}", server_url))?;
    let secret = read_secret(secret_env)?;
    let record = UserRecord::new(UserId::new(id), email, server_url, auth_type);

    let repository = open(config).await?;
    repository
        .save_secret(&secret, &record.id)
        .await
        .context("Could not save credentials")?;
    repository
        .save_user(&record)
        .await
        .context("Could not save credentials")?;

    println!("Added {} ({})", record.id, repository.storage_mode());
    Ok(())
}

async fn remove_user(config: &CliConfig, id: &str) -> Result<()> {
    let repository = open(config).await?;
    repository
        .remove_user(&UserId::new(id))
        .await
        .context("Could not remove credentials")?;

    println!("Removed {}", id);
    Ok(())
}

async fn clear(config: &CliConfig, force: bool) -> Result<()> {
    if !force {
        bail!("Refusing to remove all accounts without --force");
    }

    let repository = open(config).await?;
    repository
        .remove_all_data()
        .await
        .context("Could not remove credentials")?;

    println!("All accounts removed");
    Ok(())
}
