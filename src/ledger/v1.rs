//! The auxiliary legacy ledger (§4.6): keyed by `(issuer_type, preimage)`
//! without UUID derivation, with binary exists/not-exists semantics. Kept
//! for issuers created before the UUIDv5 scheme.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LegacyKey {
    issuer_type: String,
    preimage: Vec<u8>,
}

/// Narrower contract than [`super::Ledger`]: no equivalence classes, just
/// whether the key has been seen.
#[async_trait]
pub trait LegacyLedger: Send + Sync {
    /// Returns `true` if this is the first time `(issuer_type, preimage)`
    /// has been seen (i.e. the insert succeeded).
    async fn insert_if_absent(&self, issuer_type: &str, preimage: &[u8]) -> bool;
    async fn contains(&self, issuer_type: &str, preimage: &[u8]) -> bool;
}

#[derive(Default)]
pub struct InMemoryLegacyLedger {
    seen: RwLock<HashSet<LegacyKey>>,
}

impl InMemoryLegacyLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LegacyLedger for InMemoryLegacyLedger {
    async fn insert_if_absent(&self, issuer_type: &str, preimage: &[u8]) -> bool {
        let key = LegacyKey {
            issuer_type: issuer_type.to_string(),
            preimage: preimage.to_vec(),
        };
        self.seen.write().expect("lock not poisoned").insert(key)
    }

    async fn contains(&self, issuer_type: &str, preimage: &[u8]) -> bool {
        let key = LegacyKey {
            issuer_type: issuer_type.to_string(),
            preimage: preimage.to_vec(),
        };
        self.seen.read().expect("lock not poisoned").contains(&key)
    }
}
