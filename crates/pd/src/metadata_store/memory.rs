//! In-memory `MetadataStore` implementation.
//!
//! Suitable for single-node development and for the core's own test
//! suite; a production deployment wires in a real etcd-equivalent
//! client behind the same trait.

use crate::error::PdError;
use crate::metadata_store::r#trait::{MetadataStore, TxnCheck, TxnOp, WatchEvent, WatchEventKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    kv: HashMap<String, Vec<u8>>,
    leases: HashMap<String, Lease>,
    rev: u64,
    history: Vec<WatchEvent>,
}

impl State {
    fn record(&mut self, key: &str, kind: WatchEventKind) {
        self.rev += 1;
        self.history.push(WatchEvent { rev: self.rev, key: key.to_string(), kind });
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    state: RwLock<State>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PdError> {
        Ok(self.state.read().kv.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PdError> {
        let mut state = self.state.write();
        state.kv.insert(key.to_string(), value.clone());
        state.record(key, WatchEventKind::Put(value));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PdError> {
        let mut state = self.state.write();
        state.kv.remove(key);
        state.record(key, WatchEventKind::Delete);
        Ok(())
    }

    fn txn(&self, checks: &[TxnCheck], then: &[TxnOp], or_else: &[TxnOp]) -> Result<bool, PdError> {
        let mut state = self.state.write();
        let ok = checks.iter().all(|c| state.kv.get(&c.key) == c.expected_value.as_ref());

        let ops = if ok { then } else { or_else };
        for op in ops {
            match op {
                TxnOp::Put(key, value) => {
                    state.kv.insert(key.clone(), value.clone());
                    state.record(key, WatchEventKind::Put(value.clone()));
                }
                TxnOp::Delete(key) => {
                    state.kv.remove(key);
                    state.record(key, WatchEventKind::Delete);
                }
            }
        }
        Ok(ok)
    }

    fn campaign(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, PdError> {
        let mut state = self.state.write();
        let now = Instant::now();
        let won = match state.leases.get(key) {
            Some(lease) if lease.expires_at > now && lease.holder != holder => false,
            _ => true,
        };
        if won {
            state.leases.insert(
                key.to_string(),
                Lease {
                    holder: holder.to_string(),
                    expires_at: now + ttl,
                },
            );
        }
        Ok(won)
    }

    fn renew_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, PdError> {
        let mut state = self.state.write();
        let now = Instant::now();
        match state.leases.get_mut(key) {
            Some(lease) if lease.holder == holder && lease.expires_at > now => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn current_leader(&self, key: &str) -> Result<Option<String>, PdError> {
        let state = self.state.read();
        let now = Instant::now();
        Ok(state
            .leases
            .get(key)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.holder.clone()))
    }

    fn watch(&self, key: &str, from_rev: u64) -> Result<Vec<WatchEvent>, PdError> {
        let state = self.state.read();
        Ok(state
            .history
            .iter()
            .filter(|event| event.key == key && event.rev > from_rev)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_roundtrip() {
        let store = InMemoryMetadataStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.put("k", b"v".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn txn_cas_semantics() {
        let store = InMemoryMetadataStore::new();
        store.put("k", b"1".to_vec()).unwrap();

        let checks = vec![TxnCheck {
            key: "k".to_string(),
            expected_value: Some(b"1".to_vec()),
        }];
        let then = vec![TxnOp::Put("k".to_string(), b"2".to_vec())];
        let or_else = vec![TxnOp::Put("k".to_string(), b"stale".to_vec())];

        let committed = store.txn(&checks, &then, &or_else).unwrap();
        assert!(committed);
        assert_eq!(store.get("k").unwrap(), Some(b"2".to_vec()));

        // Second attempt with the same (now stale) expectation fails.
        let committed = store.txn(&checks, &then, &or_else).unwrap();
        assert!(!committed);
        assert_eq!(store.get("k").unwrap(), Some(b"stale".to_vec()));
    }

    #[test]
    fn campaign_only_one_winner() {
        let store = InMemoryMetadataStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.campaign("/leader", "a", ttl).unwrap());
        assert!(!store.campaign("/leader", "b", ttl).unwrap());
        assert_eq!(store.current_leader("/leader").unwrap(), Some("a".to_string()));
        // The incumbent can re-campaign (renew via campaign).
        assert!(store.campaign("/leader", "a", ttl).unwrap());
    }

    #[test]
    fn watch_returns_only_events_after_from_rev() {
        let store = InMemoryMetadataStore::new();
        store.put("k", b"1".to_vec()).unwrap();
        let after_first = store.watch("k", 0).unwrap();
        assert_eq!(after_first.len(), 1);
        let first_rev = after_first[0].rev;

        store.put("k", b"2".to_vec()).unwrap();
        store.delete("k").unwrap();

        let all = store.watch("k", 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].kind, WatchEventKind::Put(b"2".to_vec()));
        assert_eq!(all[2].kind, WatchEventKind::Delete);

        let since_first = store.watch("k", first_rev).unwrap();
        assert_eq!(since_first.len(), 2);

        // A different key's events are never returned.
        store.put("other", b"x".to_vec()).unwrap();
        assert_eq!(store.watch("k", 0).unwrap().len(), 3);
    }

    #[test]
    fn renew_lease_requires_current_holder() {
        let store = InMemoryMetadataStore::new();
        let ttl = Duration::from_secs(10);
        store.campaign("/leader", "a", ttl).unwrap();
        assert!(store.renew_lease("/leader", "a", ttl).unwrap());
        assert!(!store.renew_lease("/leader", "b", ttl).unwrap());
    }
}
