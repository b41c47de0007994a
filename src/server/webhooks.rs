//! Webhook table (§3, §4.6): rare writes, many reads. Grounded on the
//! teacher's `api::setup` random-code generation idiom, adapted to produce a
//! longer, path-unguessable id.

use std::sync::Arc;

use rand::Rng;

use crate::model::Webhook;

#[derive(Clone)]
pub struct WebhookStore {
    db: Arc<sled::Db>,
}

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

impl WebhookStore {
    pub fn open(path: &std::path::Path) -> Result<Self, sled::Error> {
        Ok(Self {
            db: Arc::new(sled::open(path)?),
        })
    }

    pub fn create(&self, exploit: String, player: String) -> Result<Webhook, sled::Error> {
        let webhook = Webhook {
            id: random_id(),
            exploit,
            player,
            disabled: false,
        };
        self.db.insert(
            webhook.id.as_bytes(),
            serde_json::to_vec(&webhook).expect("Webhook always serializes"),
        )?;
        Ok(webhook)
    }

    pub fn get(&self, id: &str) -> Result<Option<Webhook>, sled::Error> {
        Ok(self
            .db
            .get(id.as_bytes())?
            .map(|bytes| serde_json::from_slice(&bytes).expect("stored Webhook is always valid")))
    }

    pub fn list(&self) -> Result<Vec<Webhook>, sled::Error> {
        let mut rows = Vec::new();
        for entry in self.db.iter() {
            let (_, bytes) = entry?;
            rows.push(serde_json::from_slice(&bytes).expect("stored Webhook is always valid"));
        }
        Ok(rows)
    }

    pub fn update(&self, id: &str, disabled: bool) -> Result<Option<Webhook>, sled::Error> {
        let Some(mut webhook) = self.get(id)? else {
            return Ok(None);
        };
        webhook.disabled = disabled;
        self.db.insert(
            webhook.id.as_bytes(),
            serde_json::to_vec(&webhook).expect("serializes"),
        )?;
        Ok(Some(webhook))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_webhook_is_retrievable_and_enabled_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = WebhookStore::open(dir.path()).unwrap();
        let webhook = store.create("exploit1".into(), "alice".into()).unwrap();
        assert!(!webhook.disabled);
        assert_eq!(store.get(&webhook.id).unwrap().unwrap().exploit, "exploit1");
    }

    #[test]
    fn webhook_ids_are_not_trivially_guessable() {
        let dir = tempfile::tempdir().unwrap();
        let store = WebhookStore::open(dir.path()).unwrap();
        let a = store.create("exploit1".into(), "alice".into()).unwrap();
        let b = store.create("exploit1".into(), "alice".into()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }

    #[test]
    fn update_toggles_disabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = WebhookStore::open(dir.path()).unwrap();
        let webhook = store.create("exploit1".into(), "alice".into()).unwrap();
        let updated = store.update(&webhook.id, true).unwrap().unwrap();
        assert!(updated.disabled);
    }
}
