//! Rotation scheduler (§4.5). Runs on a cron-style tick (hourly in
//! production); the target-neutral contract is "exactly one successor per
//! predecessor per rotation window" — this implementation achieves it via
//! the registry's `update` being the sole mutation point per issuer, making
//! repeated ticks over the same window idempotent (property 11, §8).

use time::{Duration as TimeDuration, OffsetDateTime};

use super::cache::IssuerCache;
use super::registry::IssuerRegistry;
use super::{Issuer, IssuerId, IssuerRecordV1, PublicCommitment};
use crate::error::TokenError;
use crate::group::{Point, Scalar};

/// One rotated-or-extended issuer plus, for v1/v2, the successor created.
pub struct RotationOutcome {
    pub predecessor: IssuerId,
    pub successor: Option<IssuerId>,
}

/// Selects non-terminal issuers due for rotation and rotates each. The
/// "for update skip locked" semantics of the source system are a
/// concurrency-control detail of the chosen registry backend; the contract
/// this function relies on is simply that `update` is atomic per issuer.
pub async fn rotate_due_issuers(
    registry: &dyn IssuerRegistry,
    cache: &IssuerCache,
    now: OffsetDateTime,
    default_days_before_expiry: i64,
    default_issuer_valid_days: i64,
    v3_buffer: usize,
    v3_key_duration: TimeDuration,
) -> Result<Vec<RotationOutcome>, TokenError> {
    let horizon = now + TimeDuration::days(default_days_before_expiry);
    let all = registry.fetch_all().await?;
    let mut outcomes = Vec::new();

    for issuer in all {
        match &issuer {
            Issuer::V1(r) | Issuer::V2(r) => {
                let due = r.expires_at.is_some_and(|e| e < horizon) && r.rotated_at.is_none();
                if !due {
                    continue;
                }
                let outcome = rotate_v1(registry, cache, &issuer, r, now, default_issuer_valid_days).await?;
                outcomes.push(outcome);
            }
            Issuer::V3(r) => {
                let needs_extension = r
                    .keys
                    .iter()
                    .map(|k| k.end_at)
                    .max()
                    .is_some_and(|max_end| max_end < now + v3_key_duration * (v3_buffer as i32));
                if needs_extension {
                    extend_v3_buffer(registry, cache, r, now, v3_buffer, v3_key_duration).await?;
                    outcomes.push(RotationOutcome {
                        predecessor: issuer.id(),
                        successor: None,
                    });
                }
            }
        }
    }

    Ok(outcomes)
}

async fn rotate_v1(
    registry: &dyn IssuerRegistry,
    cache: &IssuerCache,
    issuer: &Issuer,
    r: &IssuerRecordV1,
    now: OffsetDateTime,
    default_issuer_valid_days: i64,
) -> Result<RotationOutcome, TokenError> {
    let new_key = Scalar::random();
    let g = Point::generator().scalar_mul(&Scalar::random());
    let commitment = PublicCommitment {
        g,
        h: g.scalar_mul(&new_key),
    };

    let successor = IssuerRecordV1 {
        id: uuid::Uuid::new_v4(),
        issuer_type: r.issuer_type.clone(),
        cohort: r.cohort,
        signing_key: new_key,
        commitment,
        max_tokens: r.max_tokens,
        created_at: now,
        expires_at: r.expires_at.map(|e| e + TimeDuration::days(default_issuer_valid_days)),
        rotated_at: None,
    };
    let successor_id = successor.id;
    let successor_issuer = match issuer {
        Issuer::V1(_) => Issuer::V1(successor),
        _ => Issuer::V2(successor),
    };
    registry.create(successor_issuer.clone()).await?;
    cache.invalidate(&successor_issuer);

    let mut predecessor = r.clone();
    predecessor.rotated_at = Some(now);
    let predecessor_issuer = match issuer {
        Issuer::V1(_) => Issuer::V1(predecessor),
        _ => Issuer::V2(predecessor),
    };
    let predecessor_id = predecessor_issuer.id();
    registry.update(predecessor_issuer.clone()).await?;
    cache.invalidate(&predecessor_issuer);

    Ok(RotationOutcome {
        predecessor: predecessor_id,
        successor: Some(successor_id),
    })
}

async fn extend_v3_buffer(
    registry: &dyn IssuerRegistry,
    cache: &IssuerCache,
    r: &super::IssuerRecordV3,
    now: OffsetDateTime,
    buffer: usize,
    key_duration: TimeDuration,
) -> Result<(), TokenError> {
    let mut updated = r.clone();
    let target_end = now + key_duration * (buffer as i32);
    let mut cursor = updated.keys.iter().map(|k| k.end_at).max().unwrap_or(updated.created_at);
    while cursor < target_end {
        let signing_key = Scalar::random();
        let g = Point::generator().scalar_mul(&Scalar::random());
        updated.keys.push(super::TimeBoundKey {
            signing_key,
            commitment: PublicCommitment {
                g,
                h: g.scalar_mul(&signing_key),
            },
            start_at: cursor,
            end_at: cursor + key_duration,
        });
        cursor += key_duration;
    }
    let updated_issuer = Issuer::V3(updated);
    registry.update(updated_issuer.clone()).await?;
    cache.invalidate(&updated_issuer);
    Ok(())
}
