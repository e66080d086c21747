use crate::error::{Result, WagerbookError};
use bip39::rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

// ChaCha20Poly1305 for authenticated encryption
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

const SALT_SIZE: usize = 32;

/// Secret material encrypted under a passphrase-derived key.
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub kdf_rounds: u32,
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub checksum: String,
}

/// Encrypt with a PBKDF2-SHA256 derived key and ChaCha20Poly1305
pub fn seal(data: &[u8], passphrase: &str, kdf_rounds: u32) -> Result<SealedSecret> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(passphrase, &salt, kdf_rounds);
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let cipher = ChaCha20Poly1305::new(&key);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| WagerbookError::crypto(format!("Encryption failed: {}", e)))?;

    let checksum = calculate_checksum(&ciphertext);

    Ok(SealedSecret {
        kdf_rounds,
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
        checksum,
    })
}

pub fn open(sealed: &SealedSecret, passphrase: &str) -> Result<Vec<u8>> {
    // Catches on-disk corruption before it looks like a wrong passphrase
    if calculate_checksum(&sealed.ciphertext) != sealed.checksum {
        return Err(WagerbookError::crypto("Sealed secret checksum mismatch"));
    }

    if sealed.nonce.len() != 12 {
        return Err(WagerbookError::crypto("Sealed secret has a malformed nonce"));
    }

    let key = derive_key(passphrase, &sealed.salt, sealed.kdf_rounds);
    let cipher = ChaCha20Poly1305::new(&key);
    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(nonce, sealed.ciphertext.as_ref())
        .map_err(|e| WagerbookError::crypto(format!("Decryption failed: {}", e)))
}

fn derive_key(passphrase: &str, salt: &[u8], rounds: u32) -> Key {
    use pbkdf2::pbkdf2_hmac;

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, rounds, &mut key);
    *Key::from_slice(&key)
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let data = b"abandon abandon abandon";
        let sealed = seal(data, "vault-pass", 1_000).unwrap();
        let opened = open(&sealed, "vault-pass").unwrap();

        assert_eq!(data, opened.as_slice());
        assert_ne!(sealed.ciphertext.as_slice(), data);
    }

    #[test]
    fn test_wrong_passphrase() {
        let sealed = seal(b"secret", "vault-pass", 1_000).unwrap();
        assert!(open(&sealed, "not-the-pass").is_err());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let mut sealed = seal(b"secret", "vault-pass", 1_000).unwrap();
        sealed.ciphertext[0] ^= 0xff;
        assert!(open(&sealed, "vault-pass").is_err());
    }
}
