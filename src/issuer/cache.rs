//! TTL-bounded issuer caches (§4.5): by id, by type, by cohort, by signing
//! key. Any write to the registry invalidates the affected keys.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{Cohort, Issuer, IssuerId};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A single TTL-bounded cache keyed by `K`, holding values of type `V`.
/// [`IssuerCache`] composes four of these (by id, by type, by type+cohort,
/// by signing key fingerprint).
struct TtlMap<K: std::hash::Hash + Eq + Clone, V: Clone> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> TtlMap<K, V> {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key)?;
        if hit.inserted_at.elapsed() > self.ttl {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(hit.value.clone())
    }

    fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}

/// Fingerprint of a signing key's public commitment (`H`), used as the
/// by-signing-key cache key so a Redeem request's `public_key` hint can
/// resolve directly to an issuer without scanning the registry.
fn signing_key_fingerprints(issuer: &Issuer) -> Vec<Vec<u8>> {
    match issuer {
        Issuer::V1(r) | Issuer::V2(r) => vec![r.commitment.h.encode_uncompressed()],
        Issuer::V3(r) => r.keys.iter().map(|k| k.commitment.h.encode_uncompressed()).collect(),
    }
}

pub struct IssuerCache {
    by_id: TtlMap<IssuerId, Issuer>,
    by_type: TtlMap<String, Vec<Issuer>>,
    by_type_cohort: TtlMap<(String, Cohort), Issuer>,
    by_signing_key: TtlMap<Vec<u8>, Issuer>,
}

impl IssuerCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_id: TtlMap::new(ttl),
            by_type: TtlMap::new(ttl),
            by_type_cohort: TtlMap::new(ttl),
            by_signing_key: TtlMap::new(ttl),
        }
    }

    pub fn get_by_id(&self, id: IssuerId) -> Option<Issuer> {
        self.by_id.get(&id)
    }

    pub fn get_by_type(&self, issuer_type: &str) -> Option<Vec<Issuer>> {
        self.by_type.get(&issuer_type.to_string())
    }

    pub fn get_by_type_cohort(&self, issuer_type: &str, cohort: Cohort) -> Option<Issuer> {
        self.by_type_cohort.get(&(issuer_type.to_string(), cohort))
    }

    /// Looks up the issuer owning the signing key whose public commitment
    /// encodes to `public_key_bytes` (uncompressed SEC1), if cached.
    pub fn get_by_signing_key(&self, public_key_bytes: &[u8]) -> Option<Issuer> {
        self.by_signing_key.get(&public_key_bytes.to_vec())
    }

    pub fn put(&self, issuer: Issuer) {
        self.by_id.insert(issuer.id(), issuer.clone());
        self.by_type_cohort
            .insert((issuer.issuer_type().to_string(), issuer.cohort()), issuer.clone());

        let type_key = issuer.issuer_type().to_string();
        let mut siblings: Vec<Issuer> = self
            .by_type
            .get(&type_key)
            .map(|existing| existing.into_iter().filter(|i| i.id() != issuer.id()).collect())
            .unwrap_or_default();
        siblings.push(issuer.clone());
        self.by_type.insert(type_key, siblings);

        for fingerprint in signing_key_fingerprints(&issuer) {
            self.by_signing_key.insert(fingerprint, issuer.clone());
        }
    }

    /// Invalidates every cache entry that could reference `issuer`. Called
    /// after any registry write, including rotation.
    pub fn invalidate(&self, issuer: &Issuer) {
        self.by_id.invalidate(&issuer.id());
        self.by_type_cohort
            .invalidate(&(issuer.issuer_type().to_string(), issuer.cohort()));
        self.by_type.invalidate(&issuer.issuer_type().to_string());
        for fingerprint in signing_key_fingerprints(issuer) {
            self.by_signing_key.invalidate(&fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{IssuerRecordV1, PublicCommitment};
    use crate::group::{Point, Scalar};

    fn sample_issuer() -> Issuer {
        let x = Scalar::random();
        let g = Point::generator();
        Issuer::V1(IssuerRecordV1 {
            id: uuid::Uuid::new_v4(),
            issuer_type: "captcha".into(),
            cohort: 0,
            signing_key: x,
            commitment: PublicCommitment { g, h: g.scalar_mul(&x) },
            max_tokens: 10,
            created_at: time::OffsetDateTime::now_utc(),
            expires_at: None,
            rotated_at: None,
        })
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        let issuer = sample_issuer();
        cache.put(issuer.clone());
        assert!(cache.get_by_id(issuer.id()).is_some());
        assert!(cache.get_by_type_cohort("captcha", 0).is_some());
        assert_eq!(cache.get_by_type("captcha").map(|v| v.len()), Some(1));
        let pubkey = match &issuer {
            Issuer::V1(r) => r.commitment.h.encode_uncompressed(),
            _ => unreachable!(),
        };
        assert!(cache.get_by_signing_key(&pubkey).is_some());
    }

    #[test]
    fn invalidate_removes_all_entries() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        let issuer = sample_issuer();
        cache.put(issuer.clone());
        cache.invalidate(&issuer);
        assert!(cache.get_by_id(issuer.id()).is_none());
        assert!(cache.get_by_type_cohort("captcha", 0).is_none());
        assert!(cache.get_by_type("captcha").is_none());
        let pubkey = match &issuer {
            Issuer::V1(r) => r.commitment.h.encode_uncompressed(),
            _ => unreachable!(),
        };
        assert!(cache.get_by_signing_key(&pubkey).is_none());
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = IssuerCache::new(Duration::from_millis(1));
        let issuer = sample_issuer();
        cache.put(issuer.clone());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_by_id(issuer.id()).is_none());
    }
}
