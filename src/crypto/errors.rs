//! Errors from attestation signing and verification.
//!
//! Messages describe what failed without including key bytes, seeds, or
//! signature data.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// No signer is registered under this id.
    UnsupportedSigner(String),

    /// Key or seed material is malformed (wrong length, invalid encoding).
    InvalidKeyMaterial(String),

    /// The signer could not produce a signature.
    SigningFailed {
        /// Id of the signer that failed.
        signer: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The output does not carry a well-formed attestation marker.
    InvalidAttestation(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedSigner(id) => write!(f, "unsupported signer: {id}"),
            Self::InvalidKeyMaterial(msg) => write!(f, "invalid key material: {msg}"),
            Self::SigningFailed { signer, reason } => {
                write!(f, "signing failed ({signer}): {reason}")
            }
            Self::InvalidAttestation(msg) => write!(f, "invalid attestation: {msg}"),
        }
    }
}

impl std::error::Error for CryptoError {}
