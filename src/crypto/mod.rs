//! Attestation signing for trusted-side output.
//!
//! The core only needs an append point for whatever signature a signer
//! returns. Signers are selected by id at startup through the
//! [`registry::SignerRegistry`]; the dispatcher holds one as
//! `Arc<dyn AttestationSigner>` and never names a concrete algorithm.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `CryptoError` for signing and verification |
//! | [`registry`] | Id-to-signer mapping |
//! | [`providers`] | Placeholder marker and Ed25519 signers |

#![forbid(unsafe_code)]

pub mod errors;
pub mod providers;
pub mod registry;

pub use errors::CryptoError;

/// Opaque wrapper for public key bytes. Does not implement `Display`
/// to prevent accidental logging of key material.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyBytes(pub Vec<u8>);

impl std::fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKeyBytes([{} bytes])", self.0.len())
    }
}

impl PublicKeyBytes {
    /// Parses a lowercase or uppercase hex string, surrounding whitespace
    /// ignored.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex::decode(s.trim())
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("public key hex: {e}")))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Opaque wrapper for signature bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBytes(pub Vec<u8>);

impl std::fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignatureBytes([{} bytes])", self.0.len())
    }
}

/// 32-byte Ed25519 seed. Cleared from memory on drop.
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SigningSeed([u8; 32]);

impl std::fmt::Debug for SigningSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSeed([REDACTED])")
    }
}

impl SigningSeed {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parses exactly 64 hex characters. Surrounding whitespace is ignored.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut seed = Self([0u8; 32]);
        hex::decode_to_slice(s.trim(), &mut seed.0).map_err(|e| {
            CryptoError::InvalidKeyMaterial(format!("signing seed must be 64 hex chars: {e}"))
        })?;
        Ok(seed)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Result of a signature verification operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid (the message or key doesn't match).
    Invalid {
        /// Human-readable reason for the failure.
        reason: String,
    },
}

impl VerificationResult {
    /// Returns `true` if the verification passed.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Produces the attestation for one output payload.
///
/// `sign` receives exactly the bytes written before the marker. `render`
/// turns the signature into the text placed between the marker quotes; it
/// must not contain `"` or control bytes.
pub trait AttestationSigner: Send + Sync {
    /// Registry id, also the `signer` value in the policy file.
    fn signer_id(&self) -> &'static str;

    fn sign(&self, payload: &[u8]) -> Result<SignatureBytes, CryptoError>;

    fn render(&self, signature: &SignatureBytes) -> String {
        hex::encode(&signature.0)
    }
}
