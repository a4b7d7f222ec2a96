//! Issuer registry (C5, §4.5): CRUD, cohort selection, rotation, and
//! time-windowed (v3) key buffers.

mod cache;
mod registry;
mod rotation;

pub use cache::IssuerCache;
pub use registry::{InMemoryIssuerRegistry, IssuerRegistry};
pub use rotation::{rotate_due_issuers, RotationOutcome};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::group::{Point, Scalar};

pub type IssuerId = Uuid;
pub type Cohort = u8;

/// `(G_i, H_i)` where `H_i = x · G_i`. `G_i` is a per-rotation random
/// generator, not the group's standard base point, to preserve
/// unlinkability across issuers.
#[derive(Clone, Copy, Debug)]
pub struct PublicCommitment {
    pub g: Point,
    pub h: Point,
}

/// A single time-bounded signing key in a v3 issuer's key buffer.
#[derive(Clone, Copy, Debug)]
pub struct TimeBoundKey {
    pub signing_key: Scalar,
    pub commitment: PublicCommitment,
    pub start_at: OffsetDateTime,
    pub end_at: OffsetDateTime,
}

/// Lifecycle state of one issuer. Version selects the key-material shape:
/// v1/v2 hold a single signing key; v3 holds an ordered, rolling buffer.
#[derive(Clone, Debug)]
pub enum Issuer {
    V1(IssuerRecordV1),
    V2(IssuerRecordV1),
    V3(IssuerRecordV3),
}

#[derive(Clone, Debug)]
pub struct IssuerRecordV1 {
    pub id: IssuerId,
    pub issuer_type: String,
    pub cohort: Cohort,
    pub signing_key: Scalar,
    pub commitment: PublicCommitment,
    pub max_tokens: usize,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub rotated_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug)]
pub struct IssuerRecordV3 {
    pub id: IssuerId,
    pub issuer_type: String,
    pub cohort: Cohort,
    pub max_tokens: usize,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub rotated_at: Option<OffsetDateTime>,
    pub keys: Vec<TimeBoundKey>,
    pub duration: time::Duration,
    pub buffer: usize,
}

impl Issuer {
    pub fn id(&self) -> IssuerId {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => r.id,
            Issuer::V3(r) => r.id,
        }
    }

    pub fn issuer_type(&self) -> &str {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => &r.issuer_type,
            Issuer::V3(r) => &r.issuer_type,
        }
    }

    pub fn cohort(&self) -> Cohort {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => r.cohort,
            Issuer::V3(r) => r.cohort,
        }
    }

    pub fn max_tokens(&self) -> usize {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => r.max_tokens,
            Issuer::V3(r) => r.max_tokens,
        }
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => r.expires_at,
            Issuer::V3(r) => r.expires_at,
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => r.created_at,
            Issuer::V3(r) => r.created_at,
        }
    }

    pub fn rotated_at(&self) -> Option<OffsetDateTime> {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => r.rotated_at,
            Issuer::V3(r) => r.rotated_at,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|e| e <= now)
    }

    /// Returns every `(signing_key, commitment)` pair a Redeem handler
    /// should try, ordered newest-active-first, excluding anything expired
    /// at `now`.
    pub fn active_keys(&self, now: OffsetDateTime) -> Vec<(Scalar, PublicCommitment)> {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => {
                if self.is_expired(now) {
                    vec![]
                } else {
                    vec![(r.signing_key, r.commitment)]
                }
            }
            Issuer::V3(r) => r
                .keys
                .iter()
                .filter(|k| k.start_at <= now && now < k.end_at)
                .map(|k| (k.signing_key, k.commitment))
                .collect(),
        }
    }

    /// The signing key/commitment used for new Issue requests: for v1/v2,
    /// the sole key; for v3, the window currently covering `now`.
    pub fn current_signing_key(&self, now: OffsetDateTime) -> Option<(Scalar, PublicCommitment)> {
        match self {
            Issuer::V1(r) | Issuer::V2(r) => Some((r.signing_key, r.commitment)),
            Issuer::V3(r) => r
                .keys
                .iter()
                .find(|k| k.start_at <= now && now < k.end_at)
                .map(|k| (k.signing_key, k.commitment)),
        }
    }
}
