use crate::error::{Result, WagerbookError};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const VAULT_PASSPHRASE_ENV: &str = "WAGERBOOK_VAULT_PASSPHRASE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerbookConfig {
    pub network: Network,
    pub ledger: LedgerConfig,
    pub vault: VaultConfig,
    pub wagers: WagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub gateway_url: String,
    pub query_timeout: Duration,
    pub submit_timeout: Duration,
    /// Upper bound on waiting for finality of one transfer.
    pub confirm_timeout: Duration,
    pub confirm_poll_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub kdf_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerConfig {
    /// How long a resolved wager stays listed before the reaper drops it.
    pub retention: Duration,
    pub reap_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8899".to_string(),
            query_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(15),
            confirm_timeout: Duration::from_secs(60),
            confirm_poll_interval: Duration::from_millis(500),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_rounds: 100_000,
        }
    }
}

impl Default for WagerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5 * 60),
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl Default for WagerbookConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            ledger: LedgerConfig::default(),
            vault: VaultConfig::default(),
            wagers: WagerConfig::default(),
        }
    }
}

impl WagerbookConfig {
    pub fn new(network: Network) -> Self {
        let mut config = Self::default();
        config.network = network;

        match network {
            Network::Regtest => {
                // keep defaults for regtest
            }
            Network::Signet | Network::Testnet => {
                config.ledger.confirm_timeout = Duration::from_secs(120);
                config.ledger.confirm_poll_interval = Duration::from_secs(2);
            }
            _ => {
                config.ledger.confirm_timeout = Duration::from_secs(300);
                config.ledger.confirm_poll_interval = Duration::from_secs(5);
            }
        }

        config
    }

    /// Load from a JSON file, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.gateway_url.is_empty() {
            return Err(WagerbookError::config("Ledger gateway URL cannot be empty"));
        }

        if self.ledger.query_timeout.is_zero()
            || self.ledger.submit_timeout.is_zero()
            || self.ledger.confirm_timeout.is_zero()
        {
            return Err(WagerbookError::config("Ledger timeouts must be non-zero"));
        }

        if self.ledger.confirm_poll_interval.is_zero()
            || self.ledger.confirm_poll_interval > self.ledger.confirm_timeout
        {
            return Err(WagerbookError::config(
                "Confirmation poll interval must be non-zero and below the confirmation timeout",
            ));
        }

        if self.vault.kdf_rounds == 0 {
            return Err(WagerbookError::config("KDF rounds must be greater than 0"));
        }

        if self.wagers.reap_interval.is_zero() {
            return Err(WagerbookError::config("Reap interval must be non-zero"));
        }

        Ok(())
    }
}

/// Vault passphrase from the environment; never stored in the config file.
pub fn vault_passphrase_from_env() -> Result<String> {
    std::env::var(VAULT_PASSPHRASE_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| WagerbookError::config(format!("{} is not set", VAULT_PASSPHRASE_ENV)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WagerbookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wagers.retention, Duration::from_secs(300));
        assert_eq!(config.wagers.reap_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_poll_interval_above_timeout() {
        let mut config = WagerbookConfig::new(Network::Signet);
        config.ledger.confirm_poll_interval = config.ledger.confirm_timeout * 2;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WagerbookConfig::load(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config.network, Network::Regtest);
    }

    #[tokio::test]
    async fn test_load_round_trips_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wagerbook.json");

        let mut config = WagerbookConfig::new(Network::Signet);
        config.wagers.retention = Duration::from_secs(30);
        tokio::fs::write(&path, serde_json::to_string(&config).unwrap())
            .await
            .unwrap();

        let loaded = WagerbookConfig::load(&path).await.unwrap();
        assert_eq!(loaded.network, Network::Signet);
        assert_eq!(loaded.wagers.retention, Duration::from_secs(30));
    }
}
