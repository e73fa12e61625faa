//! Signer registry.
//!
//! Built once at startup, then shared immutably. The policy names a signer
//! by id and the registry resolves it; an unknown id is a configuration
//! error, not a silent fallback.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::CryptoError;
use super::providers::ed25519::Ed25519Signer;
use super::providers::placeholder::PlaceholderSigner;
use super::{AttestationSigner, SigningSeed};

pub struct SignerRegistry {
    signers: HashMap<&'static str, Arc<dyn AttestationSigner>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self {
            signers: HashMap::new(),
        }
    }

    /// Registers `signer` under its own id, replacing any previous entry.
    pub fn register(&mut self, signer: Arc<dyn AttestationSigner>) {
        self.signers.insert(signer.signer_id(), signer);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn AttestationSigner>, CryptoError> {
        self.signers
            .get(id)
            .cloned()
            .ok_or_else(|| CryptoError::UnsupportedSigner(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.signers.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.signers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with the placeholder signer, plus Ed25519 when a seed is given.
pub fn default_registry(seed: Option<&SigningSeed>) -> SignerRegistry {
    let mut registry = SignerRegistry::new();
    registry.register(Arc::new(PlaceholderSigner));
    if let Some(seed) = seed {
        registry.register(Arc::new(Ed25519Signer::from_seed(seed)));
    }
    registry
}
