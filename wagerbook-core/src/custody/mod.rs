//! Custodial signing keys.
//!
//! Key material lives in its own database, encrypted at rest, and never in
//! the wallet state that gets snapshotted. The rest of the system only sees
//! [`TransferSigner`] capabilities.

pub mod encryption;
pub mod keys;

pub use keys::{generate_mnemonic, mnemonic_to_keypair, verify_transfer, KeypairSigner};

use crate::config::VaultConfig;
use crate::error::{Result, WagerbookError};
use crate::types::{Address, SignedTransfer, TransferRequest};
use bitcoin::Network;
use chrono::Utc;
use encryption::SealedSecret;
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Capability to authorize transfers out of one custodial address.
pub trait TransferSigner: Send + Sync {
    fn address(&self) -> &Address;

    fn sign(&self, request: TransferRequest) -> Result<SignedTransfer>;
}

pub struct KeyVault {
    conn: Mutex<Connection>,
    passphrase: String,
    kdf_rounds: u32,
    network: Network,
    signers: RwLock<HashMap<String, Arc<KeypairSigner>>>,
}

impl KeyVault {
    pub async fn open(
        db_path: &Path,
        passphrase: &str,
        config: &VaultConfig,
        network: Network,
    ) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WagerbookError::internal(format!("Failed to create directory: {}", e))
            })?;
        }

        Self::with_connection(Connection::open(db_path)?, passphrase, config, network).await
    }

    pub async fn in_memory(passphrase: &str, config: &VaultConfig, network: Network) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, passphrase, config, network).await
    }

    async fn with_connection(
        conn: Connection,
        passphrase: &str,
        config: &VaultConfig,
        network: Network,
    ) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(WagerbookError::config("Vault passphrase cannot be empty"));
        }

        let vault = Self {
            conn: Mutex::new(conn),
            passphrase: passphrase.to_string(),
            kdf_rounds: config.kdf_rounds,
            network,
            signers: RwLock::new(HashMap::new()),
        };

        vault.init_schema().await?;
        Ok(vault)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS custody_keys (
                owner TEXT PRIMARY KEY,
                network TEXT NOT NULL,
                address TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                kdf_rounds INTEGER NOT NULL,
                salt BLOB NOT NULL,
                nonce BLOB NOT NULL,
                ciphertext BLOB NOT NULL,
                checksum TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Generate and store a new key for `owner`.
    pub async fn create_key(&self, owner: &str) -> Result<Arc<dyn TransferSigner>> {
        let conn = self.conn.lock().await;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM custody_keys WHERE owner = ?1",
            params![owner],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(WagerbookError::WalletExists {
                owner: owner.to_string(),
            });
        }

        let mnemonic = generate_mnemonic()?;
        let signer = Arc::new(KeypairSigner::from_mnemonic(&mnemonic, self.network)?);
        let sealed = encryption::seal(mnemonic.as_bytes(), &self.passphrase, self.kdf_rounds)?;

        conn.execute(
            "INSERT INTO custody_keys
             (owner, network, address, created_at, kdf_rounds, salt, nonce, ciphertext, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                owner,
                self.network.to_string(),
                signer.address().as_str(),
                Utc::now().timestamp(),
                sealed.kdf_rounds,
                sealed.salt,
                sealed.nonce,
                sealed.ciphertext,
                sealed.checksum,
            ],
        )?;
        drop(conn);

        self.signers
            .write()
            .insert(owner.to_string(), signer.clone());

        tracing::info!("Created custodial key for '{}' at {}", owner, signer.address());
        Ok(signer)
    }

    pub async fn signer(&self, owner: &str) -> Result<Arc<dyn TransferSigner>> {
        if let Some(signer) = self.signers.read().get(owner) {
            return Ok(signer.clone());
        }

        let sealed = {
            let conn = self.conn.lock().await;
            conn.query_row(
                "SELECT kdf_rounds, salt, nonce, ciphertext, checksum
                 FROM custody_keys WHERE owner = ?1",
                params![owner],
                |row| {
                    Ok(SealedSecret {
                        kdf_rounds: row.get(0)?,
                        salt: row.get(1)?,
                        nonce: row.get(2)?,
                        ciphertext: row.get(3)?,
                        checksum: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| WagerbookError::WalletNotFound {
                owner: owner.to_string(),
            })?
        };

        let mnemonic = String::from_utf8(encryption::open(&sealed, &self.passphrase)?)
            .map_err(|e| WagerbookError::crypto(format!("Corrupt key material: {}", e)))?;
        let signer = Arc::new(KeypairSigner::from_mnemonic(&mnemonic, self.network)?);

        self.signers
            .write()
            .insert(owner.to_string(), signer.clone());
        Ok(signer)
    }

    /// Signer for `owner`, creating the key on first use.
    pub async fn signer_or_create(&self, owner: &str) -> Result<Arc<dyn TransferSigner>> {
        match self.signer(owner).await {
            Ok(signer) => Ok(signer),
            Err(WagerbookError::WalletNotFound { .. }) => self.create_key(owner).await,
            Err(e) => Err(e),
        }
    }

    pub async fn owners(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT owner FROM custody_keys ORDER BY created_at")?;
        let owners = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, rusqlite::Error>>()?;
        Ok(owners)
    }
}
