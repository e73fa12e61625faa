//! Attestation marker placement and checking.
//!
//! A finished document is the payload followed by
//! `, "signature": "<rendered>"}`. The signed payload is every byte before
//! the `, "signature": "` prefix, so a verifier can recover it by splitting
//! the output, with no canonicalization step.

use crate::crypto::providers::ed25519;
use crate::crypto::{AttestationSigner, CryptoError, PublicKeyBytes, SignatureBytes, VerificationResult};
use crate::serializer::BoundedWriter;

pub const MARKER_PREFIX: &[u8] = b", \"signature\": \"";
const MARKER_SUFFIX: &[u8] = b"\"}";

/// Signs what `w` holds and closes the document.
///
/// The payload comes from the writer's private copy, not from the caller's
/// buffer.
///
/// The marker and the closing brace go in as one append. If the signer
/// fails, renders unusable text, or the marker does not fit, only `}` is
/// appended (when it fits) and `false` is returned.
pub fn finish_document(w: &mut BoundedWriter<'_>, signer: &dyn AttestationSigner) -> bool {
    let rendered = match signer.sign(w.as_bytes()) {
        Ok(sig) => signer.render(&sig),
        Err(e) => {
            tracing::warn!(signer = signer.signer_id(), error = %e, "attestation signing failed");
            close(w);
            return false;
        }
    };
    if rendered.bytes().any(|b| b == b'"' || b == b'\\' || b.is_ascii_control()) {
        tracing::warn!(
            signer = signer.signer_id(),
            "rendered signature contains bytes that cannot sit inside the marker"
        );
        close(w);
        return false;
    }

    let mut fragment = Vec::with_capacity(MARKER_PREFIX.len() + rendered.len() + MARKER_SUFFIX.len());
    fragment.extend_from_slice(MARKER_PREFIX);
    fragment.extend_from_slice(rendered.as_bytes());
    fragment.extend_from_slice(MARKER_SUFFIX);

    match w.append(&fragment) {
        Ok(()) => true,
        Err(o) => {
            tracing::warn!(
                signer = signer.signer_id(),
                current = o.current,
                fragment = o.fragment,
                capacity = o.capacity,
                "attestation marker does not fit output"
            );
            close(w);
            false
        }
    }
}

fn close(w: &mut BoundedWriter<'_>) {
    if w.append(b"}").is_err() {
        tracing::warn!(len = w.len(), capacity = w.capacity(), "closing brace does not fit output");
    }
}

/// An output split at its attestation marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttestedOutput<'a> {
    /// Bytes the signer saw.
    pub payload: &'a [u8],
    /// Text between the marker quotes.
    pub rendered: &'a str,
}

/// Splits `output` at its last marker. Trailing NUL padding and ASCII
/// whitespace are ignored.
pub fn split_attested_output(output: &[u8]) -> Result<AttestedOutput<'_>, CryptoError> {
    let end = output
        .iter()
        .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let output = &output[..end];

    let start = output
        .windows(MARKER_PREFIX.len())
        .rposition(|w| w == MARKER_PREFIX)
        .ok_or_else(|| CryptoError::InvalidAttestation("no signature marker".into()))?;

    let tail = &output[start + MARKER_PREFIX.len()..];
    let body = tail
        .strip_suffix(MARKER_SUFFIX)
        .ok_or_else(|| CryptoError::InvalidAttestation("marker not closed by `\"}`".into()))?;
    let rendered = std::str::from_utf8(body)
        .map_err(|_| CryptoError::InvalidAttestation("marker is not UTF-8".into()))?;
    if rendered.contains('"') {
        return Err(CryptoError::InvalidAttestation("marker contains a quote".into()));
    }

    Ok(AttestedOutput {
        payload: &output[..start],
        rendered,
    })
}

/// Checks an Ed25519-attested output against `public_key`.
pub fn verify_attested_output(
    output: &[u8],
    public_key: &PublicKeyBytes,
) -> Result<VerificationResult, CryptoError> {
    let parts = split_attested_output(output)?;
    let signature = hex::decode(parts.rendered)
        .map(SignatureBytes)
        .map_err(|e| CryptoError::InvalidAttestation(format!("signature is not hex: {e}")))?;
    ed25519::verify(public_key, parts.payload, &signature)
}
