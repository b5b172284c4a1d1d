//! RegionCache (§4.2): id index + ordered key-range index, overlap
//! resolution, and the reverse indexes schedulers read from.

use crate::error::PdError;
use crate::metadata_store::{MetadataStore, keys};
use crate::types::{Peer, PeerId, RegionEpoch, RegionId, StoreId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownPeer {
    pub peer_id: PeerId,
    pub down_since_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub peers: Vec<Peer>,
    pub leader: Option<PeerId>,
    pub epoch: RegionEpoch,
    pub down_peers: Vec<DownPeer>,
    pub pending_peers: Vec<PeerId>,
    pub approximate_size: u64,
    pub approximate_keys: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

impl Region {
    pub fn new(id: RegionId, start_key: Vec<u8>, end_key: Vec<u8>, peers: Vec<Peer>) -> Self {
        Self {
            id,
            start_key,
            end_key,
            peers,
            leader: None,
            epoch: RegionEpoch::default(),
            down_peers: Vec::new(),
            pending_peers: Vec::new(),
            approximate_size: 0,
            approximate_keys: 0,
            bytes_written: 0,
            bytes_read: 0,
        }
    }

    /// Half-open range test; empty `end_key` means unbounded.
    fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }

    fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        let self_end_unbounded = self.end_key.is_empty();
        let other_end_unbounded = end.is_empty();
        let starts_before_other_ends = other_end_unbounded || self.start_key.as_slice() < end;
        let ends_after_other_starts = self_end_unbounded || self.end_key.as_slice() > start;
        starts_before_other_ends && ends_after_other_starts
    }

    pub fn distinct_peer_stores(&self) -> bool {
        let mut seen = HashSet::new();
        self.peers.iter().all(|p| seen.insert(p.store_id))
    }

    fn has_equivalent_state(&self, other: &Region) -> bool {
        self.peers == other.peers
            && self.leader == other.leader
            && self.down_peers == other.down_peers
            && self.pending_peers == other.pending_peers
    }

    fn ranges_or_peers_differ(&self, other: &Region) -> bool {
        self.start_key != other.start_key
            || self.end_key != other.end_key
            || self.peers != other.peers
    }
}

#[derive(Debug, Default, Clone)]
struct StoreIndex {
    leader_count: u64,
    follower_count: u64,
    peer_count: u64,
    region_size: u64,
    region_keys: u64,
    pending_peer_count: u64,
}

pub enum AcceptOutcome {
    /// Nothing changed: either rejected as stale, or an idempotent no-op.
    Unchanged,
    Accepted,
}

pub struct RegionCache {
    cluster_id: u64,
    metadata_store: Arc<dyn MetadataStore>,
    by_id: RwLock<HashMap<RegionId, Region>>,
    by_start_key: RwLock<BTreeMap<Vec<u8>, RegionId>>,
    store_index: RwLock<HashMap<StoreId, StoreIndex>>,
    hot_regions: RwLock<HashSet<RegionId>>,
}

impl RegionCache {
    pub fn new(cluster_id: u64, metadata_store: Arc<dyn MetadataStore>) -> Self {
        Self {
            cluster_id,
            metadata_store,
            by_id: RwLock::new(HashMap::new()),
            by_start_key: RwLock::new(BTreeMap::new()),
            store_index: RwLock::new(HashMap::new()),
            hot_regions: RwLock::new(HashSet::new()),
        }
    }

    pub fn get(&self, id: RegionId) -> Option<Region> {
        self.by_id.read().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Region> {
        self.by_id.read().values().cloned().collect()
    }

    /// Region whose half-open range contains `key`, if any.
    pub fn get_by_key(&self, key: &[u8]) -> Option<Region> {
        let by_start = self.by_start_key.read();
        let by_id = self.by_id.read();
        by_start
            .range(..=key.to_vec())
            .next_back()
            .and_then(|(_, id)| by_id.get(id))
            .filter(|r| r.contains_key(key))
            .cloned()
    }

    pub fn is_hot(&self, id: RegionId) -> bool {
        self.hot_regions.read().contains(&id)
    }

    pub fn mark_hot(&self, id: RegionId, hot: bool) {
        let mut hot_regions = self.hot_regions.write();
        if hot {
            hot_regions.insert(id);
        } else {
            hot_regions.remove(&id);
        }
    }

    /// Implements the acceptance protocol of §4.2: staleness rejection,
    /// idempotence, update-in-place, and overlap resolution.
    pub fn set_region(&self, incoming: Region) -> Result<AcceptOutcome, PdError> {
        let mut by_id = self.by_id.write();
        let mut by_start = self.by_start_key.write();

        if let Some(existing) = by_id.get(&incoming.id) {
            if incoming.epoch.is_stale_relative_to(&existing.epoch) {
                return Err(PdError::StaleEpoch {
                    region_id: incoming.id,
                    reported: incoming.epoch,
                    current: existing.epoch,
                });
            }
            if incoming.epoch == existing.epoch && incoming.has_equivalent_state(existing) {
                return Ok(AcceptOutcome::Unchanged);
            }
        }

        // Overlap resolution: evict any region whose range intersects
        // the incoming one and whose epoch does not dominate it.
        let overlapping_ids: Vec<RegionId> = by_id
            .values()
            .filter(|r| r.id != incoming.id && r.overlaps(&incoming.start_key, &incoming.end_key))
            .map(|r| r.id)
            .collect();

        for overlap_id in &overlapping_ids {
            let overlap = by_id.get(overlap_id).expect("listed above");
            if overlap.epoch.version > incoming.epoch.version
                || (overlap.epoch.version == incoming.epoch.version
                    && overlap.epoch.conf_ver > incoming.epoch.conf_ver)
            {
                return Err(PdError::RegionOverlap { region_id: incoming.id });
            }
        }

        let needs_persist = match by_id.get(&incoming.id) {
            Some(existing) => incoming.ranges_or_peers_differ(existing),
            None => true,
        };

        for overlap_id in overlapping_ids {
            if let Some(evicted) = by_id.remove(&overlap_id) {
                by_start.remove(&evicted.start_key);
                self.remove_from_store_index(&evicted);
                let _ = self
                    .metadata_store
                    .delete(&keys::region(self.cluster_id, evicted.id.0));
            }
        }

        if let Some(old) = by_id.get(&incoming.id) {
            by_start.remove(&old.start_key);
            self.remove_from_store_index(old);
        }

        if needs_persist {
            let value = format!("{}\n{}", incoming.epoch.conf_ver, incoming.epoch.version).into_bytes();
            self.metadata_store
                .put(&keys::region(self.cluster_id, incoming.id.0), value)?;
        }

        by_start.insert(incoming.start_key.clone(), incoming.id);
        self.add_to_store_index(&incoming);
        by_id.insert(incoming.id, incoming);

        Ok(AcceptOutcome::Accepted)
    }

    fn add_to_store_index(&self, region: &Region) {
        let mut index = self.store_index.write();
        let pending: HashSet<PeerId> = region.pending_peers.iter().copied().collect();
        for peer in &region.peers {
            let entry = index.entry(peer.store_id).or_default();
            entry.peer_count += 1;
            entry.region_size += region.approximate_size;
            entry.region_keys += region.approximate_keys;
            if Some(peer.id) == region.leader {
                entry.leader_count += 1;
            } else {
                entry.follower_count += 1;
            }
            if pending.contains(&peer.id) {
                entry.pending_peer_count += 1;
            }
        }
    }

    fn remove_from_store_index(&self, region: &Region) {
        let mut index = self.store_index.write();
        let pending: HashSet<PeerId> = region.pending_peers.iter().copied().collect();
        for peer in &region.peers {
            if let Some(entry) = index.get_mut(&peer.store_id) {
                entry.peer_count = entry.peer_count.saturating_sub(1);
                entry.region_size = entry.region_size.saturating_sub(region.approximate_size);
                entry.region_keys = entry.region_keys.saturating_sub(region.approximate_keys);
                if Some(peer.id) == region.leader {
                    entry.leader_count = entry.leader_count.saturating_sub(1);
                } else {
                    entry.follower_count = entry.follower_count.saturating_sub(1);
                }
                if pending.contains(&peer.id) {
                    entry.pending_peer_count = entry.pending_peer_count.saturating_sub(1);
                }
            }
        }
    }

    pub fn leader_count(&self, store: StoreId) -> u64 {
        self.store_index.read().get(&store).map(|i| i.leader_count).unwrap_or(0)
    }

    pub fn follower_count(&self, store: StoreId) -> u64 {
        self.store_index.read().get(&store).map(|i| i.follower_count).unwrap_or(0)
    }

    pub fn peer_count(&self, store: StoreId) -> u64 {
        self.store_index.read().get(&store).map(|i| i.peer_count).unwrap_or(0)
    }

    pub fn pending_peer_count(&self, store: StoreId) -> u64 {
        self.store_index
            .read()
            .get(&store)
            .map(|i| i.pending_peer_count)
            .unwrap_or(0)
    }

    /// Regions with a leader peer on `store`.
    pub fn leader_regions_on(&self, store: StoreId) -> Vec<Region> {
        self.by_id
            .read()
            .values()
            .filter(|r| r.leader.map(|l| r.peers.iter().any(|p| p.id == l && p.store_id == store)).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Regions with any peer (leader or follower) on `store`.
    pub fn regions_on(&self, store: StoreId) -> Vec<Region> {
        self.by_id
            .read()
            .values()
            .filter(|r| r.peers.iter().any(|p| p.store_id == store))
            .cloned()
            .collect()
    }

    /// Peers whose store has been down longer than `max_down_time`.
    pub fn is_peer_confirmed_down(&self, down: &DownPeer, max_down_time: Duration) -> bool {
        Duration::from_secs(down.down_since_secs) > max_down_time
    }
}
