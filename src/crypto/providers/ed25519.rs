//! Ed25519 attestation using `ed25519-dalek`.
//!
//! Signing uses a 32-byte seed supplied by the host. Verification uses
//! `verify_strict()`, which rejects weak public keys and non-canonical
//! signatures.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::crypto::errors::CryptoError;
use crate::crypto::{AttestationSigner, PublicKeyBytes, SignatureBytes, SigningSeed, VerificationResult};

/// Ed25519 signer. The expanded key is zeroized on drop by `ed25519-dalek`.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: &SigningSeed) -> Self {
        Self {
            key: SigningKey::from_bytes(seed.as_bytes()),
        }
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.key.verifying_key().to_bytes().to_vec())
    }

    /// `sha256:<hex>` of the raw public key.
    pub fn key_id(&self) -> String {
        key_id(&self.public_key())
    }
}

impl AttestationSigner for Ed25519Signer {
    fn signer_id(&self) -> &'static str {
        "ed25519"
    }

    fn sign(&self, payload: &[u8]) -> Result<SignatureBytes, CryptoError> {
        let sig = self
            .key
            .try_sign(payload)
            .map_err(|e| CryptoError::SigningFailed {
                signer: "ed25519".into(),
                reason: e.to_string(),
            })?;
        Ok(SignatureBytes(sig.to_bytes().to_vec()))
    }
}

/// Stable identifier for a public key: `sha256:` + lowercase hex digest.
pub fn key_id(public_key: &PublicKeyBytes) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(&public_key.0)))
}

/// Verifies `signature` over `message`.
///
/// Malformed keys are an error; a malformed or non-matching signature is
/// `Ok(Invalid)`.
pub fn verify(
    public_key: &PublicKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<VerificationResult, CryptoError> {
    let pk_bytes: &[u8; 32] = public_key.0.as_slice().try_into().map_err(|_| {
        CryptoError::InvalidKeyMaterial(format!(
            "Ed25519 public key must be 32 bytes, got {}",
            public_key.0.len()
        ))
    })?;

    let vk = VerifyingKey::from_bytes(pk_bytes)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("invalid Ed25519 public key: {e}")))?;

    let Ok(sig) = Signature::from_slice(&signature.0) else {
        return Ok(VerificationResult::Invalid {
            reason: format!("signature must be 64 bytes, got {}", signature.0.len()),
        });
    };

    match vk.verify_strict(message, &sig) {
        Ok(()) => Ok(VerificationResult::Valid),
        Err(_) => Ok(VerificationResult::Invalid {
            reason: "Ed25519 signature verification failed".into(),
        }),
    }
}
