//! Flag Store (C7, §4.7). A persistent table with a unique secondary index
//! on `value` — implemented by using the value itself as the sled key, which
//! gives insert-if-absent dedup for free via `compare_and_swap`.
//!
//! Grounded on the teacher's `storage::AnalysisStorage` (`Arc<sled::Db>`
//! behind a small typed API), adapted from a timestamp-keyed history table to
//! a value-keyed unique index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Flag, FlagStatus};

#[derive(Clone)]
pub struct FlagStore {
    db: Arc<sled::Db>,
}

/// Our transaction closures never call `tx.abort(..)`, so the abort arm
/// (sled's default unconstrained abort type, `()`) never actually occurs.
fn unwrap_transaction<T>(result: sled::transaction::TransactionResult<T, ()>) -> Result<T, sled::Error> {
    result.map_err(|e| match e {
        sled::transaction::TransactionError::Storage(e) => e,
        sled::transaction::TransactionError::Abort(()) => {
            unreachable!("transaction closures here never call tx.abort")
        }
    })
}

/// Outcome of [`FlagStore::insert`]: whether a row was newly created or the
/// value was already present (invariant i, §3).
pub enum InsertOutcome {
    New,
    Duplicate,
}

impl FlagStore {
    pub fn open(path: &std::path::Path) -> Result<Self, sled::Error> {
        Ok(Self {
            db: Arc::new(sled::open(path)?),
        })
    }

    /// Inserts a flag with conflict-ignore semantics: a second insertion of
    /// the same `value` is a duplicate and leaves the store unchanged.
    pub fn insert(&self, flag: Flag) -> Result<InsertOutcome, sled::Error> {
        let key = flag.value.as_bytes();
        let bytes = serde_json::to_vec(&flag).expect("Flag always serializes");
        match self.db.compare_and_swap(key, None as Option<&[u8]>, Some(bytes))? {
            Ok(()) => Ok(InsertOutcome::New),
            Err(_) => Ok(InsertOutcome::Duplicate),
        }
    }

    pub fn get(&self, value: &str) -> Result<Option<Flag>, sled::Error> {
        Ok(self
            .db
            .get(value.as_bytes())?
            .map(|bytes| serde_json::from_slice(&bytes).expect("stored Flag is always valid")))
    }

    pub fn select_by_status(&self, status: FlagStatus) -> Result<Vec<Flag>, sled::Error> {
        let mut rows = Vec::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            let flag: Flag = serde_json::from_slice(&bytes).expect("stored Flag is always valid");
            if flag.status == status {
                rows.push(flag);
            }
        }
        Ok(rows)
    }

    /// Transactionally updates the status and response of every flag whose
    /// value is a key in `updates`. Values not present in the store are
    /// silently skipped (they were never queued to begin with). Runs inside
    /// a single sled transaction so a round's writes either all land or none
    /// do — no reader ever observes half a submission round applied.
    pub fn bulk_update_status(
        &self,
        updates: &HashMap<String, (FlagStatus, String)>,
    ) -> Result<(), sled::Error> {
        let result = self.db.transaction(|tx| {
            for (value, (status, response)) in updates {
                if let Some(bytes) = tx.get(value.as_bytes())? {
                    let mut flag: Flag =
                        serde_json::from_slice(&bytes).expect("stored Flag is always valid");
                    flag.status = *status;
                    flag.response = Some(response.clone());
                    tx.insert(value.as_bytes(), serde_json::to_vec(&flag).expect("serializes"))?;
                }
            }
            Ok(())
        });
        unwrap_transaction(result)?;
        self.db.flush()?;
        Ok(())
    }

    /// Atomically inserts every flag in `flags`, each already resolved to its
    /// final status, skipping (as a duplicate) any value already present.
    /// Used by the manual-submit path (§4.6/§9), where a flag must never be
    /// recorded as `queued` only to have the submitter call fail afterward:
    /// either the whole batch lands with its terminal status, or none of it
    /// does.
    pub fn insert_all_with_status(
        &self,
        flags: Vec<Flag>,
    ) -> Result<(Vec<String>, Vec<String>), sled::Error> {
        let result = self.db.transaction(|tx| {
            let mut new = Vec::new();
            let mut duplicates = Vec::new();
            for flag in &flags {
                if tx.get(flag.value.as_bytes())?.is_some() {
                    duplicates.push(flag.value.clone());
                    continue;
                }
                tx.insert(flag.value.as_bytes(), serde_json::to_vec(flag).expect("serializes"))?;
                new.push(flag.value.clone());
            }
            Ok((new, duplicates))
        });
        let (new, duplicates) = unwrap_transaction(result)?;
        self.db.flush()?;
        Ok((new, duplicates))
    }

    /// Every stored flag, for the search DSL (§6 `POST /search`) to filter
    /// and sort in memory — the store is small enough (one event per
    /// submitted flag) that a full scan per search is acceptable.
    pub fn all(&self) -> Result<Vec<Flag>, sled::Error> {
        let mut rows = Vec::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            rows.push(serde_json::from_slice(&bytes).expect("stored Flag is always valid"));
        }
        Ok(rows)
    }

    pub fn count_by_status(&self) -> Result<HashMap<FlagStatus, usize>, sled::Error> {
        let mut counts = HashMap::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            let flag: Flag = serde_json::from_slice(&bytes).expect("stored Flag is always valid");
            *counts.entry(flag.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub fn count_by_status_for_tick(
        &self,
        tick: u64,
    ) -> Result<HashMap<FlagStatus, usize>, sled::Error> {
        let mut counts = HashMap::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            let flag: Flag = serde_json::from_slice(&bytes).expect("stored Flag is always valid");
            if flag.tick == tick {
                *counts.entry(flag.status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// `group-by (player, exploit, tick) count where status=accepted and tick
    /// in [lo, hi] and exploit != 'manual'` (§4.7), shaped for the
    /// `/exploit-analytics` response (§6).
    pub fn analytics(
        &self,
        tick_lo: u64,
        tick_hi: u64,
    ) -> Result<HashMap<(String, String), Vec<usize>>, sled::Error> {
        let span = (tick_hi - tick_lo + 1) as usize;
        let mut series: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            let flag: Flag = serde_json::from_slice(&bytes).expect("stored Flag is always valid");
            if flag.status != FlagStatus::Accepted
                || flag.exploit == crate::model::MANUAL_EXPLOIT
                || flag.tick < tick_lo
                || flag.tick > tick_hi
            {
                continue;
            }
            let series_vec = series
                .entry((flag.player.clone(), flag.exploit.clone()))
                .or_insert_with(|| vec![0; span]);
            series_vec[(flag.tick - tick_lo) as usize] += 1;
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(value: &str, tick: u64) -> Flag {
        Flag::new_queued(value.into(), "exploit1".into(), "alice".into(), "10.0.0.1".into(), tick)
    }

    #[test]
    fn s1_dedup_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlagStore::open(dir.path()).unwrap();

        assert!(matches!(store.insert(flag("A", 0)).unwrap(), InsertOutcome::New));
        assert!(matches!(store.insert(flag("B", 0)).unwrap(), InsertOutcome::New));
        assert!(matches!(store.insert(flag("B", 0)).unwrap(), InsertOutcome::Duplicate));
        assert!(matches!(store.insert(flag("C", 0)).unwrap(), InsertOutcome::New));

        let counts = store.count_by_status().unwrap();
        assert_eq!(counts.get(&FlagStatus::Queued), Some(&3));
    }

    #[test]
    fn bulk_update_transitions_status_and_leaves_missing_values_queued() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlagStore::open(dir.path()).unwrap();
        store.insert(flag("v1", 0)).unwrap();
        store.insert(flag("v2", 0)).unwrap();
        store.insert(flag("v3", 0)).unwrap();

        let mut updates = HashMap::new();
        updates.insert("v1".to_string(), (FlagStatus::Accepted, "ok".to_string()));
        updates.insert("v2".to_string(), (FlagStatus::Rejected, "old".to_string()));
        store.bulk_update_status(&updates).unwrap();

        assert_eq!(store.get("v1").unwrap().unwrap().status, FlagStatus::Accepted);
        assert_eq!(store.get("v2").unwrap().unwrap().status, FlagStatus::Rejected);
        assert_eq!(store.get("v3").unwrap().unwrap().status, FlagStatus::Queued);
    }

    #[test]
    fn accepted_is_terminal_and_not_reverted_by_a_later_bulk_update_omission() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlagStore::open(dir.path()).unwrap();
        store.insert(flag("v1", 0)).unwrap();
        let mut updates = HashMap::new();
        updates.insert("v1".to_string(), (FlagStatus::Accepted, "ok".to_string()));
        store.bulk_update_status(&updates).unwrap();

        // A later round with no entry for v1 must leave it untouched.
        store.bulk_update_status(&HashMap::new()).unwrap();
        assert_eq!(store.get("v1").unwrap().unwrap().status, FlagStatus::Accepted);
    }
}
