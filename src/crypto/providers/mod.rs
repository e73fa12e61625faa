//! Concrete `AttestationSigner` implementations.
//!
//! | Signer | Marker | Verifiable |
//! |--------|--------|------------|
//! | [`placeholder`] | `FAKE_SIGNATURE_FROM_TA` | No |
//! | [`ed25519`] | 128 hex chars | Yes, with the published public key |

pub mod ed25519;
pub mod placeholder;
