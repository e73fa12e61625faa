//! Fixed-marker signer.
//!
//! Emits the same marker for every payload. Output signed this way carries
//! no cryptographic assurance; it keeps the wire format byte-compatible
//! with clients that only check for the marker's presence.

use crate::crypto::errors::CryptoError;
use crate::crypto::{AttestationSigner, SignatureBytes};

pub const PLACEHOLDER_SIGNATURE: &str = "FAKE_SIGNATURE_FROM_TA";

pub struct PlaceholderSigner;

impl AttestationSigner for PlaceholderSigner {
    fn signer_id(&self) -> &'static str {
        "placeholder"
    }

    fn sign(&self, _payload: &[u8]) -> Result<SignatureBytes, CryptoError> {
        Ok(SignatureBytes(PLACEHOLDER_SIGNATURE.as_bytes().to_vec()))
    }

    fn render(&self, signature: &SignatureBytes) -> String {
        String::from_utf8_lossy(&signature.0).into_owned()
    }
}
