//! Fallback Store (C5, §4.5). A local durable table of flags that failed to
//! reach the server, drained once per tick.
//!
//! Grounded on the teacher's `storage::AnalysisStorage` for the sled-wrapping
//! idiom (`Arc<sled::Db>` behind a small typed API) and on
//! `fleet::queue::UploadQueue` for the enqueue/drain/mark-uploaded shape,
//! adapted so a row's `pending -> forwarded` transition is an in-place field
//! update rather than a file rename/delete.

use std::sync::Arc;

use chrono::Utc;

use crate::error::FallbackError;
use crate::model::{EnqueueFallbackItem, FallbackFlag, FallbackStatus};

#[derive(Clone)]
pub struct FallbackStore {
    db: Arc<sled::Db>,
}

impl FallbackStore {
    pub fn open(path: &std::path::Path) -> Result<Self, FallbackError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Records a flag that could not be enqueued with the server. Idempotent
    /// on `value`: re-recording an already-pending or already-forwarded value
    /// is a no-op, since the value is the key.
    pub fn record(&self, value: &str, exploit: &str, target: &str) -> Result<(), FallbackError> {
        if self.db.contains_key(value.as_bytes())? {
            return Ok(());
        }
        let row = FallbackFlag {
            value: value.to_string(),
            exploit: exploit.to_string(),
            target: target.to_string(),
            timestamp: Utc::now(),
            status: FallbackStatus::Pending,
        };
        let bytes = serde_json::to_vec(&row)?;
        self.db.insert(value.as_bytes(), bytes)?;
        Ok(())
    }

    /// All rows currently `pending`, in insertion order.
    pub fn pending(&self) -> Result<Vec<FallbackFlag>, FallbackError> {
        let mut rows = Vec::new();
        for entry in self.db.iter() {
            let (_, value) = entry?;
            let row: FallbackFlag = serde_json::from_slice(&value)?;
            if matches!(row.status, FallbackStatus::Pending) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Marks rows `forwarded` after the server has acknowledged them via
    /// `enqueue-fallback`. Never re-sent after this point.
    pub fn mark_forwarded(&self, values: &[String]) -> Result<(), FallbackError> {
        for value in values {
            if let Some(bytes) = self.db.get(value.as_bytes())? {
                let mut row: FallbackFlag = serde_json::from_slice(&bytes)?;
                row.status = FallbackStatus::Forwarded;
                self.db.insert(value.as_bytes(), serde_json::to_vec(&row)?)?;
            }
        }
        self.db.flush()?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize, FallbackError> {
        Ok(self.pending()?.len())
    }
}

impl From<&FallbackFlag> for EnqueueFallbackItem {
    fn from(row: &FallbackFlag) -> Self {
        Self {
            flag: row.value.clone(),
            exploit: row.exploit.clone(),
            target: row.target.clone(),
            player: String::new(),
            timestamp: Some(row.timestamp),
        }
    }
}

/// Runs one fallback-drain cycle (§4.5): read all `pending` rows, POST them
/// as a single batch, mark forwarded on success, stop (retry next tick) on
/// server error.
pub async fn drain_once(
    store: &FallbackStore,
    client: &super::http_client::ServerClient,
    player: &str,
) -> anyhow::Result<usize> {
    let pending = store.pending()?;
    if pending.is_empty() {
        return Ok(0);
    }
    let items: Vec<EnqueueFallbackItem> = pending
        .iter()
        .map(|row| {
            let mut item: EnqueueFallbackItem = row.into();
            item.player = player.to_string();
            item
        })
        .collect();

    match client.enqueue_fallback(&items).await {
        Ok(()) => {
            let values: Vec<String> = pending.iter().map(|r| r.value.clone()).collect();
            store.mark_forwarded(&values)?;
            Ok(values.len())
        }
        Err(e) => {
            tracing::warn!(error = %e, "fallback drain failed, retrying next tick");
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_list_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::open(dir.path()).unwrap();
        store.record("FLAG{a}", "exploit1", "10.0.0.1").unwrap();
        store.record("FLAG{b}", "exploit1", "10.0.0.2").unwrap();
        assert_eq!(store.pending_count().unwrap(), 2);
    }

    #[test]
    fn recording_same_value_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::open(dir.path()).unwrap();
        store.record("FLAG{a}", "exploit1", "10.0.0.1").unwrap();
        store.record("FLAG{a}", "exploit1", "10.0.0.1").unwrap();
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn mark_forwarded_removes_from_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::open(dir.path()).unwrap();
        store.record("FLAG{a}", "exploit1", "10.0.0.1").unwrap();
        store.mark_forwarded(&["FLAG{a}".to_string()]).unwrap();
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[test]
    fn forwarded_rows_survive_restart_and_stay_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FallbackStore::open(dir.path()).unwrap();
            store.record("FLAG{a}", "exploit1", "10.0.0.1").unwrap();
            store.mark_forwarded(&["FLAG{a}".to_string()]).unwrap();
        }
        let store = FallbackStore::open(dir.path()).unwrap();
        assert_eq!(store.pending_count().unwrap(), 0);
    }
}
