//! Redemption ledger (C6, §4.6): at-most-once insert keyed by
//! `UUIDv5(issuer_id, preimage)`, three-way equivalence classification.

mod bloom;
mod memory;
pub mod v1;

pub use bloom::SpentTokenFilter;
pub use memory::InMemoryLedger;

use tracing::trace;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::issuer::IssuerId;

/// Namespace UUID used to derive redemption ids deterministically from
/// `(issuer_id, preimage)`.
const REDEMPTION_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9f, 0x3a, 0x1c, 0x7e, 0x5b, 0x2d, 0x48, 0x6a, 0x91, 0x0e, 0x3c, 0x7b, 0x2a, 0x5d, 0x0f, 0x1e,
]);

pub fn redemption_id(issuer_id: IssuerId, preimage: &[u8]) -> Uuid {
    let mut name = issuer_id.as_bytes().to_vec();
    name.extend_from_slice(preimage);
    Uuid::new_v5(&REDEMPTION_NAMESPACE, &name)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redemption {
    pub id: Uuid,
    pub issuer_id: IssuerId,
    pub preimage: Vec<u8>,
    pub payload: Vec<u8>,
    pub timestamp: OffsetDateTime,
    pub ttl: Option<OffsetDateTime>,
    pub offset: u64,
}

impl Redemption {
    pub fn new(
        issuer_id: IssuerId,
        preimage: Vec<u8>,
        payload: Vec<u8>,
        ttl: Option<OffsetDateTime>,
        offset: u64,
    ) -> Self {
        Redemption {
            id: redemption_id(issuer_id, &preimage),
            issuer_id,
            preimage,
            payload,
            timestamp: OffsetDateTime::now_utc(),
            ttl,
            offset,
        }
    }
}

/// Classification of an incoming redemption against an existing record
/// sharing the same `id` (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Equivalence {
    NoEquivalence,
    IdEquivalence,
    IdAndAllValueEquivalence,
}

pub fn check_equivalence(new: &Redemption, old: &Redemption) -> Equivalence {
    if new.payload == old.payload && new.offset == old.offset {
        Equivalence::IdAndAllValueEquivalence
    } else {
        Equivalence::IdEquivalence
    }
}

/// Storage contract for the redemption ledger. `persist` is the sole
/// mutation entry point; its atomicity on the `id` uniqueness constraint is
/// the backend's responsibility.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically inserts `redemption` iff no record with the same `id`
    /// exists. On conflict, returns the already-persisted record so the
    /// caller can classify equivalence.
    async fn persist(&self, redemption: Redemption) -> Result<(), (Equivalence, Redemption)>;

    /// Atomically inserts every member of `redemptions`, or none of them.
    /// Validates the whole batch (against existing records and against
    /// duplicates within the batch itself) before committing any entry, so
    /// a conflict anywhere in the batch leaves the ledger untouched.
    ///
    /// On conflict, returns the index of the first offending redemption
    /// together with its equivalence classification and the conflicting
    /// record already on file (or, for an intra-batch duplicate, the
    /// earlier member of the same batch).
    async fn persist_all(
        &self,
        redemptions: Vec<Redemption>,
    ) -> Result<(), (usize, Equivalence, Redemption)>;

    async fn get(&self, id: Uuid) -> Result<Option<Redemption>, LedgerError>;
}

/// Inserts `redemption`, classifying the outcome against
/// `tolerable_equivalence`. An equivalence result outside that set is
/// reported as [`LedgerError::DuplicateRedemption`].
///
/// `filter`, when present, is consulted before `persist` and updated after a
/// successful insert. It is advisory only (§9 Design Notes): its answer
/// never changes the outcome of this call, which always consults the
/// authoritative `ledger`.
pub async fn redeem(
    ledger: &dyn Ledger,
    redemption: Redemption,
    tolerable_equivalence: &[Equivalence],
    filter: Option<&SpentTokenFilter>,
) -> Result<(), LedgerError> {
    if let Some(f) = filter {
        if f.probably_contains(redemption.id.as_bytes()) {
            trace!(id = %redemption.id, "negative cache hit, still consulting ledger");
        }
    }

    let outcome = match ledger.persist(redemption.clone()).await {
        Ok(()) => Ok(()),
        Err((equivalence, _existing)) => {
            if tolerable_equivalence.contains(&equivalence) {
                Ok(())
            } else {
                Err(LedgerError::DuplicateRedemption(equivalence))
            }
        }
    };

    if outcome.is_ok() {
        if let Some(f) = filter {
            f.insert(redemption.id.as_bytes());
        }
    }

    outcome
}

/// Inserts every member of `redemptions` as one atomic unit via
/// [`Ledger::persist_all`]. Any duplicate, at any position in the batch,
/// fails the whole batch and leaves the ledger untouched — bulk redemption
/// (§6) does not tolerate partial success the way single-token [`redeem`]
/// tolerates `tolerable_equivalence`.
pub async fn redeem_all(
    ledger: &dyn Ledger,
    redemptions: Vec<Redemption>,
    filter: Option<&SpentTokenFilter>,
) -> Result<(), LedgerError> {
    if let Some(f) = filter {
        for redemption in &redemptions {
            if f.probably_contains(redemption.id.as_bytes()) {
                trace!(id = %redemption.id, "negative cache hit, still consulting ledger");
            }
        }
    }

    let ids: Vec<_> = redemptions.iter().map(|r| r.id).collect();
    match ledger.persist_all(redemptions).await {
        Ok(()) => {
            if let Some(f) = filter {
                for id in &ids {
                    f.insert(id.as_bytes());
                }
            }
            Ok(())
        }
        Err((_index, equivalence, _conflicting)) => Err(LedgerError::DuplicateRedemption(equivalence)),
    }
}
