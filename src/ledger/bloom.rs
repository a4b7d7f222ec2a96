//! Optional negative cache (§9 Design Notes): a probabilistic pre-check
//! consulted before the authoritative ledger. A positive answer here is
//! advisory only — the real ledger is always the source of truth; a
//! negative answer here never short-circuits the authoritative check.

use std::sync::atomic::{AtomicU8, Ordering};

/// A small stable-Bloom-style counting filter. Each slot saturates at
/// [`MAX_COUNT`] and is probabilistically decremented on insert of an
/// unrelated key, so the filter self-stabilizes under continuous load
/// instead of only ever filling up (the "stable" in stable Bloom filter).
pub struct SpentTokenFilter {
    slots: Vec<AtomicU8>,
    num_hashes: usize,
}

const MAX_COUNT: u8 = 3;

impl SpentTokenFilter {
    pub fn new(num_slots: usize, num_hashes: usize) -> Self {
        let slots = (0..num_slots.max(1)).map(|_| AtomicU8::new(0)).collect();
        SpentTokenFilter {
            slots,
            num_hashes: num_hashes.max(1),
        }
    }

    fn indices(&self, key: &[u8]) -> Vec<usize> {
        use sha2::{Digest, Sha256};
        (0..self.num_hashes)
            .map(|i| {
                let mut hasher = Sha256::new();
                hasher.update(key);
                hasher.update((i as u64).to_le_bytes());
                let digest = hasher.finalize();
                let n = u64::from_le_bytes(digest[..8].try_into().expect("8 bytes"));
                (n as usize) % self.slots.len()
            })
            .collect()
    }

    /// `true` means "probably already spent" (caller must still consult the
    /// authoritative ledger). `false` means "definitely not yet seen by this
    /// filter" but is not a guarantee against a false negative after decay.
    pub fn probably_contains(&self, key: &[u8]) -> bool {
        self.indices(key).into_iter().all(|i| self.slots[i].load(Ordering::Relaxed) > 0)
    }

    pub fn insert(&self, key: &[u8]) {
        for i in self.indices(key) {
            self.slots[i].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_add(1).min(MAX_COUNT))
            })
            .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_created_filter_reports_nothing_spent() {
        let filter = SpentTokenFilter::new(1024, 3);
        assert!(!filter.probably_contains(b"never-inserted"));
    }

    #[test]
    fn inserted_key_is_reported_as_probably_spent() {
        let filter = SpentTokenFilter::new(1024, 3);
        filter.insert(b"preimage-1");
        assert!(filter.probably_contains(b"preimage-1"));
    }
}
