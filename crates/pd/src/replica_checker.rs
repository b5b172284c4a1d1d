//! ReplicaChecker (§4.3): per-region predicate producing at most one
//! operator that repairs missing/extra/down/offline/mis-placed replicas.

use crate::config::ReplicationConfig;
use crate::operator::{Operator, OperatorInfluence, OperatorKind, OperatorStep};
use crate::region::{Region, RegionCache};
use crate::store::{Store, StoreCache, StoreState};
use crate::types::{Peer, PeerId, StoreId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct ReplicaChecker {
    store_cache: Arc<StoreCache>,
    region_cache: Arc<RegionCache>,
    config: ReplicationConfig,
    max_down_time: Duration,
}

impl ReplicaChecker {
    pub fn new(
        store_cache: Arc<StoreCache>,
        region_cache: Arc<RegionCache>,
        config: ReplicationConfig,
        max_down_time: Duration,
    ) -> Self {
        Self { store_cache, region_cache, config, max_down_time }
    }

    pub fn check(&self, region: &Region, now: DateTime<Utc>) -> Option<Operator> {
        if let Some(op) = self.check_down_peer(region, now) {
            return Some(op);
        }
        if let Some(op) = self.check_offline_peer(region, now) {
            return Some(op);
        }
        if let Some(op) = self.check_missing_replica(region, now) {
            return Some(op);
        }
        if let Some(op) = self.check_extra_replica(region, now) {
            return Some(op);
        }
        self.check_mis_placement(region, now)
    }

    fn check_down_peer(&self, region: &Region, now: DateTime<Utc>) -> Option<Operator> {
        let down = region.down_peers.iter().find(|d| {
            Duration::from_secs(d.down_since_secs) > self.max_down_time
                && self.store_for_peer(region, d.peer_id).map(|s| s.is_down(now, self.max_down_time)).unwrap_or(true)
        })?;

        let peer = down.peer_id;
        let store_id = region.peers.iter().find(|p| p.id == peer).map(|p| p.store_id)?;
        let mut influence = HashMap::new();
        influence.insert(store_id, OperatorInfluence { leader_delta: 0, region_size_delta: -1 });

        Some(
            Operator::new(
                region.id,
                OperatorKind::RemovePeer,
                vec![OperatorStep::RemovePeer { peer }],
                now,
            )
            .with_influence(influence)
            .with_epoch(region.epoch),
        )
    }

    fn check_offline_peer(&self, region: &Region, now: DateTime<Utc>) -> Option<Operator> {
        let offline_peer = region.peers.iter().find(|p| {
            self.store_cache.get(p.store_id).map(|s| s.state == StoreState::Offline).unwrap_or(false)
        })?;

        let target = self.pick_replacement(region, offline_peer.store_id, now)?;
        Some(self.add_peer_operator(region, target, now))
    }

    fn check_missing_replica(&self, region: &Region, now: DateTime<Utc>) -> Option<Operator> {
        if (region.peers.len() as u64) >= self.config.max_replicas {
            return None;
        }
        let occupied: std::collections::HashSet<StoreId> = region.peers.iter().map(|p| p.store_id).collect();
        let target = self.best_candidate(region, &occupied, now)?;
        Some(self.add_peer_operator(region, target, now))
    }

    fn check_extra_replica(&self, region: &Region, now: DateTime<Utc>) -> Option<Operator> {
        if (region.peers.len() as u64) <= self.config.max_replicas {
            return None;
        }
        let worst = self.worst_peer(region)?;
        let mut influence = HashMap::new();
        influence.insert(worst.store_id, OperatorInfluence { leader_delta: 0, region_size_delta: -1 });
        Some(
            Operator::new(
                region.id,
                OperatorKind::RemovePeer,
                vec![OperatorStep::RemovePeer { peer: worst.id }],
                now,
            )
            .with_influence(influence)
            .with_epoch(region.epoch),
        )
    }

    fn check_mis_placement(&self, region: &Region, now: DateTime<Utc>) -> Option<Operator> {
        if self.config.location_labels.is_empty() {
            return None;
        }
        let occupied: std::collections::HashSet<StoreId> = region.peers.iter().map(|p| p.store_id).collect();

        let current_worst = region
            .peers
            .iter()
            .map(|p| {
                let peer_labels = self.peer_label_sets(region, Some(p.store_id));
                (p.store_id, distinct_score(&self.labels_for(p.store_id), &self.config.location_labels, &peer_labels))
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())?;

        let candidate = self.best_candidate(region, &occupied, now)?;
        let candidate_score = distinct_score(
            &self.labels_for(candidate),
            &self.config.location_labels,
            &self.peer_label_sets(region, Some(current_worst.0)),
        );

        if candidate_score > current_worst.1 {
            Some(self.add_peer_operator(region, candidate, now))
        } else {
            None
        }
    }

    fn add_peer_operator(&self, region: &Region, target: StoreId, now: DateTime<Utc>) -> Operator {
        let peer_id = PeerId(next_synthetic_peer_id(region));
        let mut influence = HashMap::new();
        influence.insert(target, OperatorInfluence { leader_delta: 0, region_size_delta: 1 });
        Operator::new(
            region.id,
            OperatorKind::AddPeer,
            vec![OperatorStep::AddPeer { peer: peer_id, store_id: target }],
            now,
        )
        .with_influence(influence)
        .with_epoch(region.epoch)
    }

    fn store_for_peer(&self, region: &Region, peer: PeerId) -> Option<Store> {
        let store_id = region.peers.iter().find(|p| p.id == peer)?.store_id;
        self.store_cache.get(store_id).ok()
    }

    fn labels_for(&self, store: StoreId) -> Vec<String> {
        self.store_cache
            .get(store)
            .ok()
            .map(|s| {
                self.config
                    .location_labels
                    .iter()
                    .map(|k| s.label_value(k).unwrap_or("").to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn peer_label_sets(&self, region: &Region, exclude: Option<StoreId>) -> Vec<Vec<String>> {
        region
            .peers
            .iter()
            .filter(|p| Some(p.store_id) != exclude)
            .map(|p| self.labels_for(p.store_id))
            .collect()
    }

    /// Best eligible store not already hosting a peer: maximize distinct
    /// score, then minimize region-score (§4.3.1).
    fn best_candidate(&self, region: &Region, occupied: &std::collections::HashSet<StoreId>, now: DateTime<Utc>) -> Option<StoreId> {
        let peer_labels = self.peer_label_sets(region, None);
        let mut best: Option<(StoreId, f64, f64)> = None;
        for store in self.store_cache.list() {
            if occupied.contains(&store.id) {
                continue;
            }
            if self.store_cache.filter(store.id, now).is_err() {
                continue;
            }
            let score = distinct_score(&self.labels_for(store.id), &self.config.location_labels, &peer_labels);
            let region_score = store.region_score();
            let better = match &best {
                None => true,
                Some((_, best_score, best_region_score)) => {
                    score > *best_score
                        || (score == *best_score && region_score < *best_region_score)
                        || (score == *best_score && region_score == *best_region_score && store.id.0 < best.unwrap().0.0)
                }
            };
            if better {
                best = Some((store.id, score, region_score));
            }
        }
        best.map(|(id, _, _)| id)
    }

    /// Worst peer to remove first when over-replicated: reuses the same
    /// comparison rule as candidate selection, inverted.
    fn worst_peer(&self, region: &Region) -> Option<Peer> {
        let peer_labels = self.peer_label_sets(region, None);
        region
            .peers
            .iter()
            .map(|p| {
                let score = distinct_score(&self.labels_for(p.store_id), &self.config.location_labels, &peer_labels);
                let region_score = self.store_cache.get(p.store_id).map(|s| s.region_score()).unwrap_or(0.0);
                (*p, score, region_score)
            })
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap()
                    .then(b.2.partial_cmp(&a.2).unwrap())
                    .then(b.0.store_id.0.cmp(&a.0.store_id.0))
            })
            .map(|(p, _, _)| p)
    }

    fn pick_replacement(&self, region: &Region, exclude_store: StoreId, now: DateTime<Utc>) -> Option<StoreId> {
        let mut occupied: std::collections::HashSet<StoreId> = region.peers.iter().map(|p| p.store_id).collect();
        occupied.insert(exclude_store);
        self.best_candidate(region, &occupied, now)
    }
}

/// Synthetic peer id for a new peer slated to join `region`; the real
/// system mints this via the shared `IdAllocator` — callers wire that in
/// by remapping this placeholder before admission.
fn next_synthetic_peer_id(region: &Region) -> u64 {
    region.peers.iter().map(|p| p.id.0).max().unwrap_or(0) + 1
}

/// §4.3.1 distinct score: `Σ 100^(L − i − 1)` over peer stores `S`,
/// where `i` is the smallest label index at which the candidate
/// *diverges* from a peer (and `L` when it matches on every level —
/// fully co-located, the least distinct placement). Rewards divergence
/// at the most significant (shallowest) label level.
pub fn distinct_score(candidate_labels: &[String], location_labels: &[String], peer_label_sets: &[Vec<String>]) -> f64 {
    let l = location_labels.len();
    if l == 0 {
        return 0.0;
    }
    peer_label_sets
        .iter()
        .map(|peer_labels| {
            let i = (0..l)
                .find(|&idx| candidate_labels.get(idx) != peer_labels.get(idx))
                .unwrap_or(l);
            100f64.powi((l - i) as i32 - 1)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::InMemoryMetadataStore;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn distinct_score_rewards_divergence_at_shallow_label() {
        let location = labels(&["zone", "rack", "host"]);
        // Differs at zone (index 0): most distinct.
        let different_zone = distinct_score(&labels(&["z2", "r1", "h1"]), &location, &[labels(&["z1", "r1", "h1"])]);
        // Differs only at host (index 2): least distinct among divergent pairs.
        let same_zone_rack = distinct_score(&labels(&["z1", "r1", "h2"]), &location, &[labels(&["z1", "r1", "h1"])]);
        // Matches on every level: fully co-located.
        let identical = distinct_score(&labels(&["z1", "r1", "h1"]), &location, &[labels(&["z1", "r1", "h1"])]);

        assert!(different_zone > same_zone_rack);
        assert!(same_zone_rack > identical);
    }

    fn setup(max_replicas: u64, location_labels: Vec<String>) -> (ReplicaChecker, Arc<StoreCache>, Arc<RegionCache>) {
        let md: Arc<InMemoryMetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let stores = Arc::new(StoreCache::new(1, md.clone()));
        let regions = Arc::new(RegionCache::new(1, md));
        let config = ReplicationConfig { max_replicas, location_labels };
        let checker = ReplicaChecker::new(stores.clone(), regions.clone(), config, Duration::from_secs(60));
        (checker, stores, regions)
    }

    fn put_store(stores: &StoreCache, id: u64, labels_kv: &[(&str, &str)]) {
        let mut s = Store::new(StoreId(id), format!("10.0.0.{id}:20160"));
        for (k, v) in labels_kv {
            s.labels.insert(k.to_string(), v.to_string());
        }
        stores.put(s).unwrap();
        stores
            .handle_store_heartbeat(
                StoreId(id),
                crate::store::StoreStats { capacity: 100, available: 80, ..Default::default() },
                false,
                Utc::now(),
            )
            .unwrap();
    }

    #[test]
    fn adds_peer_when_under_replicated() {
        let (checker, stores, _regions) = setup(3, vec![]);
        for id in 1..=4 {
            put_store(&stores, id, &[]);
        }
        let region = Region::new(
            crate::types::RegionId(1),
            vec![],
            vec![],
            vec![Peer { id: PeerId(1), store_id: StoreId(1) }, Peer { id: PeerId(2), store_id: StoreId(2) }],
        );
        let op = checker.check(&region, Utc::now()).unwrap();
        assert_eq!(op.kind, OperatorKind::AddPeer);
        match op.steps[0] {
            OperatorStep::AddPeer { store_id, .. } => assert!(!matches!(store_id.0, 1 | 2)),
            _ => panic!("expected AddPeer"),
        }
    }

    #[test]
    fn prefers_distinct_zone_over_region_score() {
        let (checker, stores, _regions) = setup(3, vec!["zone".to_string()]);
        put_store(&stores, 1, &[("zone", "z1")]);
        put_store(&stores, 2, &[("zone", "z1")]);
        put_store(&stores, 3, &[("zone", "z2")]);
        // Store 4 is same-zone as 1/2 but has a much better region score;
        // it must still lose to store 3's zone divergence.
        put_store(&stores, 4, &[("zone", "z1")]);

        let region = Region::new(
            crate::types::RegionId(1),
            vec![],
            vec![],
            vec![Peer { id: PeerId(1), store_id: StoreId(1) }, Peer { id: PeerId(2), store_id: StoreId(2) }],
        );
        let op = checker.check(&region, Utc::now()).unwrap();
        match op.steps[0] {
            OperatorStep::AddPeer { store_id, .. } => assert_eq!(store_id, StoreId(3)),
            _ => panic!("expected AddPeer"),
        }
    }
}
