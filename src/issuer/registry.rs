//! The issuer registry contract plus an in-memory implementation used by
//! tests and as the default when no persistence backend is configured.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{Cohort, Issuer, IssuerId};
use crate::error::TokenError;

/// Operations a persistence backend must provide for issuer lifecycle
/// management (§4.5). Implementations are free to choose any storage
/// engine; this crate only depends on the contract.
#[async_trait]
pub trait IssuerRegistry: Send + Sync {
    async fn create(&self, issuer: Issuer) -> Result<(), TokenError>;
    async fn fetch_by_id(&self, id: IssuerId) -> Result<Option<Issuer>, TokenError>;

    /// Newest first by `expires_at DESC NULLS LAST, created_at DESC`.
    async fn fetch_by_type(&self, issuer_type: &str) -> Result<Vec<Issuer>, TokenError>;
    async fn fetch_by_type_and_cohort(
        &self,
        issuer_type: &str,
        cohort: Cohort,
    ) -> Result<Vec<Issuer>, TokenError>;
    async fn fetch_all(&self) -> Result<Vec<Issuer>, TokenError>;

    /// Replaces the stored record for `issuer.id()`, used by rotation to
    /// mark a predecessor `rotated_at` or to extend a v3 key buffer.
    async fn update(&self, issuer: Issuer) -> Result<(), TokenError>;

    /// Latest non-terminal (not yet rotated, not expired) issuer for a
    /// `(type, cohort)` pair, used to pick the signer for new Issue
    /// requests.
    async fn latest_active(
        &self,
        issuer_type: &str,
        cohort: Cohort,
        now: OffsetDateTime,
    ) -> Result<Option<Issuer>, TokenError> {
        let candidates = self.fetch_by_type_and_cohort(issuer_type, cohort).await?;
        Ok(candidates
            .into_iter()
            .filter(|i| i.rotated_at().is_none() && !i.is_expired(now))
            .max_by_key(|i| i.created_at()))
    }
}

#[derive(Default)]
pub struct InMemoryIssuerRegistry {
    issuers: RwLock<HashMap<IssuerId, Issuer>>,
}

impl InMemoryIssuerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssuerRegistry for InMemoryIssuerRegistry {
    async fn create(&self, issuer: Issuer) -> Result<(), TokenError> {
        let mut guard = self.issuers.write().expect("lock not poisoned");
        guard.insert(issuer.id(), issuer);
        Ok(())
    }

    async fn fetch_by_id(&self, id: IssuerId) -> Result<Option<Issuer>, TokenError> {
        Ok(self.issuers.read().expect("lock not poisoned").get(&id).cloned())
    }

    async fn fetch_by_type(&self, issuer_type: &str) -> Result<Vec<Issuer>, TokenError> {
        let guard = self.issuers.read().expect("lock not poisoned");
        let mut out: Vec<Issuer> = guard
            .values()
            .filter(|i| i.issuer_type() == issuer_type)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            // NULLS LAST on expires_at DESC, then created_at DESC.
            match (a.expires_at(), b.expires_at()) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then_with(|| b.created_at().cmp(&a.created_at()))
        });
        Ok(out)
    }

    async fn fetch_by_type_and_cohort(
        &self,
        issuer_type: &str,
        cohort: Cohort,
    ) -> Result<Vec<Issuer>, TokenError> {
        Ok(self
            .fetch_by_type(issuer_type)
            .await?
            .into_iter()
            .filter(|i| i.cohort() == cohort)
            .collect())
    }

    async fn fetch_all(&self) -> Result<Vec<Issuer>, TokenError> {
        Ok(self.issuers.read().expect("lock not poisoned").values().cloned().collect())
    }

    async fn update(&self, issuer: Issuer) -> Result<(), TokenError> {
        let mut guard = self.issuers.write().expect("lock not poisoned");
        guard.insert(issuer.id(), issuer);
        Ok(())
    }
}
