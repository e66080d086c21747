use anyhow::Context;
use dialoguer::Password;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wagerbook_core::config::vault_passphrase_from_env;
use wagerbook_core::{HttpLedger, KeyVault, Ledger, SqliteSnapshotStore, WagerbookConfig};
use wagerbook_rps::{LogNotifier, WagerService};

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wagerbook")
}

/// Everything a command needs, opened from the data directory.
pub struct App {
    pub service: WagerService,
    pub config: WagerbookConfig,
}

impl App {
    pub async fn open(data_dir: &Path, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = config_path.unwrap_or_else(|| data_dir.join("config.json"));
        let config = WagerbookConfig::load(&config_path)
            .await
            .with_context(|| format!("loading config from {}", config_path.display()))?;

        let passphrase = match vault_passphrase_from_env() {
            Ok(passphrase) => passphrase,
            Err(_) => Password::new()
                .with_prompt("Vault passphrase")
                .interact()
                .context("reading vault passphrase")?,
        };

        let vault = KeyVault::open(
            &data_dir.join("vault.db"),
            &passphrase,
            &config.vault,
            config.network,
        )
        .await
        .context("opening key vault")?;

        let client = HttpLedger::new(&config.ledger.gateway_url).context("creating ledger client")?;
        let ledger = Ledger::new(Arc::new(client), config.ledger.clone());
        let store = SqliteSnapshotStore::new(&data_dir.join("state.db"))
            .await
            .context("opening state store")?;

        let service = WagerService::open(
            Arc::new(vault),
            ledger,
            Arc::new(store),
            Arc::new(LogNotifier),
            &config.wagers,
        )
        .await
        .context("restoring wager state")?;

        Ok(Self { service, config })
    }
}
