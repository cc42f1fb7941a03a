use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

use crate::error::{AppError, Result};
use crate::services::hasher::digest_bytes;

/// Signing identity of a ledger uploader.
///
/// The address is the `0x`-prefixed hex public key; the secret half never
/// leaves this type.
pub struct LedgerSigner {
    signing_key: SigningKey,
    address: String,
}

impl LedgerSigner {
    /// Load a signer from a hex-encoded 32-byte seed
    pub fn from_hex(seed: &str) -> Result<Self> {
        let trimmed = seed.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(trimmed, &mut bytes)
            .map_err(|e| AppError::Internal(format!("Invalid ledger signer key: {}", e)))?;
        Ok(Self::from_seed(bytes))
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = format!("0x{}", hex::encode(signing_key.verifying_key().to_bytes()));
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign the raw bytes of a digest
    pub fn sign_digest(&self, digest: &str) -> Result<String> {
        let message = digest_bytes(digest)?;
        let signature = self.signing_key.sign(&message);
        Ok(format!("0x{}", hex::encode(signature.to_bytes())))
    }

    /// Check a signature produced by `sign_digest` against a signer address
    pub fn verify(address: &str, digest: &str, signature: &str) -> Result<bool> {
        let message = digest_bytes(digest)?;

        let mut key_bytes = [0u8; 32];
        if hex::decode_to_slice(address.trim_start_matches("0x"), &mut key_bytes).is_err() {
            return Ok(false);
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return Ok(false);
        };

        let mut sig_bytes = [0u8; 64];
        if hex::decode_to_slice(signature.trim_start_matches("0x"), &mut sig_bytes).is_err() {
            return Ok(false);
        }
        let signature = Signature::from_bytes(&sig_bytes);

        Ok(verifying_key.verify(&message, &signature).is_ok())
    }
}

impl std::fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
