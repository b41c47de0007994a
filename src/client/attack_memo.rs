//! Attack memo (§3): a durable set of already-completed `(host, flag_id)`
//! pairs, consulted only when an exploit module exposes flag-id hints.

use std::sync::Arc;

use crate::model::Attack;

#[derive(Clone)]
pub struct AttackMemo {
    db: Arc<sled::Db>,
}

fn key(attack: &Attack) -> Vec<u8> {
    format!("{}\0{}", attack.host, attack.flag_id).into_bytes()
}

impl AttackMemo {
    pub fn open(path: &std::path::Path) -> Result<Self, sled::Error> {
        Ok(Self {
            db: Arc::new(sled::open(path)?),
        })
    }

    /// Records a completed attack, ignoring duplicates.
    pub fn record(&self, attack: &Attack) -> Result<(), sled::Error> {
        self.db.insert(key(attack), &[][..])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_an_attack_persists_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let memo = AttackMemo::open(dir.path()).unwrap();
        let attack = Attack { host: "10.0.0.1".into(), flag_id: "f1".into() };
        assert!(!memo.db.contains_key(key(&attack)).unwrap());
        memo.record(&attack).unwrap();
        assert!(memo.db.contains_key(key(&attack)).unwrap());
    }

    #[test]
    fn recording_the_same_attack_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let memo = AttackMemo::open(dir.path()).unwrap();
        let attack = Attack { host: "10.0.0.1".into(), flag_id: "f1".into() };
        memo.record(&attack).unwrap();
        memo.record(&attack).unwrap();
        assert!(memo.db.contains_key(key(&attack)).unwrap());
    }
}
