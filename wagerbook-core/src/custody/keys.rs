use crate::custody::TransferSigner;
use crate::error::{Result, WagerbookError};
use crate::types::{Address, SignedTransfer, TransferRequest};
use bip39::{Language, Mnemonic};
use bitcoin::key::{CompressedPublicKey, Keypair};
use bitcoin::secp256k1::{schnorr, All, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::Network;
use std::str::FromStr;

pub fn generate_mnemonic() -> Result<String> {
    let mut rng = bip39::rand::thread_rng();
    let mnemonic = Mnemonic::generate_in_with(&mut rng, Language::English, 24)
        .map_err(|e| WagerbookError::internal(format!("Failed to generate mnemonic: {}", e)))?;
    Ok(mnemonic.to_string())
}

pub fn mnemonic_to_keypair(mnemonic: &str, network: Network) -> Result<Keypair> {
    let mnemonic = Mnemonic::parse_in(Language::English, mnemonic)
        .map_err(|e| WagerbookError::signer(format!("Invalid mnemonic: {}", e)))?;

    let seed = mnemonic.to_seed("");
    let secp = Secp256k1::new();

    let master_key = bitcoin::bip32::Xpriv::new_master(network, &seed)
        .map_err(|e| WagerbookError::signer(format!("Failed to derive master key: {}", e)))?;

    let path = bitcoin::bip32::DerivationPath::from_str("m/84'/0'/0'/0/0")
        .map_err(|e| WagerbookError::signer(format!("Invalid derivation path: {}", e)))?;

    let child_key = master_key
        .derive_priv(&secp, &path)
        .map_err(|e| WagerbookError::signer(format!("Failed to derive child key: {}", e)))?;

    let secret_key = SecretKey::from_slice(&child_key.private_key.secret_bytes())
        .map_err(|e| WagerbookError::signer(format!("Invalid secret key: {}", e)))?;

    Ok(Keypair::from_secret_key(&secp, &secret_key))
}

pub fn p2wpkh_address(public_key: &PublicKey, network: Network) -> Address {
    let wpkh = CompressedPublicKey(*public_key);
    Address::new(bitcoin::Address::p2wpkh(&wpkh, network).to_string())
}

/// Custodial signer backed by a single secp256k1 keypair.
pub struct KeypairSigner {
    keypair: Keypair,
    address: Address,
    secp: Secp256k1<All>,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair, network: Network) -> Self {
        let address = p2wpkh_address(&keypair.public_key(), network);
        Self {
            keypair,
            address,
            secp: Secp256k1::new(),
        }
    }

    pub fn from_mnemonic(mnemonic: &str, network: Network) -> Result<Self> {
        Ok(Self::new(mnemonic_to_keypair(mnemonic, network)?, network))
    }

    /// Fresh key that is never written anywhere.
    pub fn generate(network: Network) -> Result<Self> {
        Self::from_mnemonic(&generate_mnemonic()?, network)
    }
}

impl TransferSigner for KeypairSigner {
    fn address(&self) -> &Address {
        &self.address
    }

    fn sign(&self, request: TransferRequest) -> Result<SignedTransfer> {
        if request.from != self.address {
            return Err(WagerbookError::signer(format!(
                "Signer for {} cannot spend from {}",
                self.address, request.from
            )));
        }

        let message = Message::from_digest(request.digest());
        let signature = self.secp.sign_schnorr_no_aux_rand(&message, &self.keypair);

        Ok(SignedTransfer {
            request,
            public_key: hex::encode(self.keypair.public_key().serialize()),
            signature: hex::encode(signature.serialize()),
        })
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Check that `transfer` is signed by the key that owns its source address.
pub fn verify_transfer(transfer: &SignedTransfer, network: Network) -> Result<()> {
    let key_bytes = hex::decode(&transfer.public_key)
        .map_err(|e| WagerbookError::signer(format!("Malformed public key: {}", e)))?;
    let public_key = PublicKey::from_slice(&key_bytes)
        .map_err(|e| WagerbookError::signer(format!("Malformed public key: {}", e)))?;

    if p2wpkh_address(&public_key, network) != transfer.request.from {
        return Err(WagerbookError::signer(format!(
            "Key does not own {}",
            transfer.request.from
        )));
    }

    let sig_bytes = hex::decode(&transfer.signature)
        .map_err(|e| WagerbookError::signer(format!("Malformed signature: {}", e)))?;
    let signature = schnorr::Signature::from_slice(&sig_bytes)
        .map_err(|e| WagerbookError::signer(format!("Malformed signature: {}", e)))?;

    let message = Message::from_digest(transfer.request.digest());
    let (x_only, _) = public_key.x_only_public_key();

    Secp256k1::verification_only()
        .verify_schnorr(&signature, &message, &x_only)
        .map_err(|e| WagerbookError::signer(format!("Bad signature: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Amount;

    #[test]
    fn test_mnemonic_derivation_is_deterministic() {
        let mnemonic = generate_mnemonic().unwrap();
        let a = KeypairSigner::from_mnemonic(&mnemonic, Network::Regtest).unwrap();
        let b = KeypairSigner::from_mnemonic(&mnemonic, Network::Regtest).unwrap();

        assert_eq!(a.address(), b.address());
        assert!(a.address().as_str().starts_with("bcrt1"));
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = KeypairSigner::generate(Network::Regtest).unwrap();
        let request = TransferRequest::new(
            signer.address().clone(),
            Address::new("bcrt1qpot"),
            Amount::from_sat(42),
        );

        let signed = signer.sign(request).unwrap();
        assert!(verify_transfer(&signed, Network::Regtest).is_ok());

        let mut forged = signed.clone();
        forged.request.amount = Amount::from_sat(4_200);
        assert!(verify_transfer(&forged, Network::Regtest).is_err());
    }

    #[test]
    fn test_refuses_foreign_source() {
        let signer = KeypairSigner::generate(Network::Regtest).unwrap();
        let request = TransferRequest::new(
            Address::new("bcrt1qsomeoneelse"),
            Address::new("bcrt1qpot"),
            Amount::from_sat(1),
        );
        assert!(signer.sign(request).is_err());
    }
}
