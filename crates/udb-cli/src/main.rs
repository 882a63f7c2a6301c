use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use udb_crypto::EncryptionKey;
use udb_store::{Store, StoreConfig, DATABASE_VERSION};

#[derive(Parser)]
#[command(name = "udb-cli")]
#[command(about = "Operator CLI for the encrypted user database", long_about = None)]
struct Cli {
    /// JSON store configuration file
    #[arg(long, global = true, env = "USERDB_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true, env = "USERDB_DATABASE")]
    database: Option<PathBuf>,

    /// Hex encryption key file (overrides the config file)
    #[arg(long, global = true, env = "USERDB_ENCRYPTION_KEY")]
    encryption_key: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new encryption key file
    NewKey {
        /// Where to write the key; an existing file is never overwritten
        #[arg(long)]
        out: PathBuf,
    },

    /// Open the database and report its state
    Check,

    /// List users without secrets
    ListUsers,

    /// Re-encrypt every user under a new key
    RotateKey {
        /// Hex key file holding the new key
        #[arg(long)]
        new_key: PathBuf,
    },

    /// Overwrite the paywall address index
    SetPaywallIndex {
        index: u64,
    },
}

impl Cli {
    fn store_config(&self) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::load(path)?,
            None => {
                let database = self
                    .database
                    .clone()
                    .ok_or_else(|| anyhow!("--database or --config is required"))?;
                let key = self
                    .encryption_key
                    .clone()
                    .ok_or_else(|| anyhow!("--encryption-key or --config is required"))?;
                StoreConfig::new(database, key)
            }
        };
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(key) = &self.encryption_key {
            config.encryption_key = key.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("udb_store=info,udb_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::NewKey { out } = &cli.command {
        EncryptionKey::generate()
            .save(out)
            .with_context(|| format!("writing key to {}", out.display()))?;
        info!(path = %out.display(), "Encryption key written");
        return Ok(());
    }

    let config = cli.store_config()?;
    let store = Store::open(&config)
        .await
        .with_context(|| format!("opening {}", config.database.display()))?;

    let result = run(&store, &cli.command).await;
    store.close().await?;
    result
}

async fn run(store: &Store, command: &Commands) -> Result<()> {
    match command {
        Commands::NewKey { .. } => return Err(anyhow!("new-key does not operate on a store")),
        Commands::Check => {
            let report = json!({
                "version": DATABASE_VERSION,
                "users": store.count_users().await?,
                "paywallAddressIndex": store.paywall_address_index().await?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ListUsers => {
            let mut users = Vec::new();
            store
                .for_each(|user| {
                    users.push(json!({
                        "id": user.id.to_string(),
                        "username": user.username,
                        "paywallAddressIndex": user.paywall_address_index,
                        "admin": user.admin,
                        "deactivated": user.deactivated,
                    }))
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        Commands::RotateKey { new_key } => {
            let report = store.rotate_from_file(new_key).await?;
            println!("{}", json!({ "usersRotated": report.users_rotated }));
        }
        Commands::SetPaywallIndex { index } => {
            store.set_paywall_address_index(*index).await?;
            println!("{}", json!({ "paywallAddressIndex": index }));
        }
    }
    Ok(())
}
