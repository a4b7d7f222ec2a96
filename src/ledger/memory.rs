use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{check_equivalence, Equivalence, Ledger, Redemption};
use crate::error::LedgerError;

/// In-memory ledger used by tests and as the default backend when no SQL
/// store is configured. Atomicity is provided by a single `RwLock`.
#[derive(Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<Uuid, Redemption>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn persist(&self, redemption: Redemption) -> Result<(), (Equivalence, Redemption)> {
        let mut guard = self.records.write().expect("lock not poisoned");
        match guard.get(&redemption.id) {
            Some(existing) => {
                let equivalence = check_equivalence(&redemption, existing);
                Err((equivalence, existing.clone()))
            }
            None => {
                guard.insert(redemption.id, redemption);
                Ok(())
            }
        }
    }

    async fn persist_all(
        &self,
        redemptions: Vec<Redemption>,
    ) -> Result<(), (usize, Equivalence, Redemption)> {
        let mut guard = self.records.write().expect("lock not poisoned");

        // Validate the whole batch, against both the existing map and
        // earlier members of this same batch, before committing anything.
        let mut seen_in_batch: HashMap<Uuid, &Redemption> = HashMap::new();
        for (index, redemption) in redemptions.iter().enumerate() {
            if let Some(existing) = guard.get(&redemption.id) {
                let equivalence = check_equivalence(redemption, existing);
                return Err((index, equivalence, existing.clone()));
            }
            if let Some(earlier) = seen_in_batch.get(&redemption.id) {
                let equivalence = check_equivalence(redemption, earlier);
                return Err((index, equivalence, (*earlier).clone()));
            }
            seen_in_batch.insert(redemption.id, redemption);
        }

        for redemption in redemptions {
            guard.insert(redemption.id, redemption);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Redemption>, LedgerError> {
        Ok(self.records.read().expect("lock not poisoned").get(&id).cloned())
    }
}
