//! Conversions between `pd`'s in-process types and the generated wire
//! types in `pd-proto`.

use pd::config::{ReplicationConfig, ScheduleConfig};
use pd::operator::OperatorStep;
use pd::region::{DownPeer, Region};
use pd::store::{Store, StoreState, StoreStats};
use pd::types::{Peer, PeerId, RegionEpoch, RegionId, StoreId, Timestamp};

pub fn peer_to_proto(peer: &Peer) -> pd_proto::Peer {
    pd_proto::Peer { id: peer.id.0, store_id: peer.store_id.0 }
}

pub fn peer_from_proto(peer: &pd_proto::Peer) -> Peer {
    Peer { id: PeerId(peer.id), store_id: StoreId(peer.store_id) }
}

pub fn region_to_proto(region: &Region) -> pd_proto::Region {
    pd_proto::Region {
        id: region.id.0,
        start_key: region.start_key.clone(),
        end_key: region.end_key.clone(),
        peers: region.peers.iter().map(peer_to_proto).collect(),
        leader_id: region.leader.map(|p| p.0).unwrap_or(0),
        epoch: Some(pd_proto::RegionEpoch { conf_ver: region.epoch.conf_ver, version: region.epoch.version }),
        down_peers: region
            .down_peers
            .iter()
            .map(|d| pd_proto::DownPeer { peer_id: d.peer_id.0, down_since_secs: d.down_since_secs })
            .collect(),
        pending_peer_ids: region.pending_peers.iter().map(|p| p.0).collect(),
        approximate_size: region.approximate_size,
        approximate_keys: region.approximate_keys,
        bytes_written: region.bytes_written,
        bytes_read: region.bytes_read,
    }
}

pub fn region_from_proto(region: &pd_proto::Region) -> Region {
    let epoch = region.epoch.as_ref().map(|e| RegionEpoch::new(e.conf_ver, e.version)).unwrap_or_default();
    Region {
        id: RegionId(region.id),
        start_key: region.start_key.clone(),
        end_key: region.end_key.clone(),
        peers: region.peers.iter().map(peer_from_proto).collect(),
        leader: if region.leader_id == 0 { None } else { Some(PeerId(region.leader_id)) },
        epoch,
        down_peers: region
            .down_peers
            .iter()
            .map(|d| DownPeer { peer_id: PeerId(d.peer_id), down_since_secs: d.down_since_secs })
            .collect(),
        pending_peers: region.pending_peer_ids.iter().map(|id| PeerId(*id)).collect(),
        approximate_size: region.approximate_size,
        approximate_keys: region.approximate_keys,
        bytes_written: region.bytes_written,
        bytes_read: region.bytes_read,
    }
}

pub fn store_state_to_proto(state: StoreState) -> i32 {
    match state {
        StoreState::Up => pd_proto::StoreState::Up as i32,
        StoreState::Offline => pd_proto::StoreState::Offline as i32,
        StoreState::Tombstone => pd_proto::StoreState::Tombstone as i32,
    }
}

pub fn store_state_from_proto(state: i32) -> StoreState {
    match pd_proto::StoreState::try_from(state).unwrap_or(pd_proto::StoreState::Up) {
        pd_proto::StoreState::Up => StoreState::Up,
        pd_proto::StoreState::Offline => StoreState::Offline,
        pd_proto::StoreState::Tombstone => StoreState::Tombstone,
    }
}

pub fn store_stats_to_proto(stats: &StoreStats) -> pd_proto::StoreStats {
    pd_proto::StoreStats {
        capacity: stats.capacity,
        available: stats.available,
        region_count: stats.region_count,
        leader_count: stats.leader_count,
        applying_snapshot_count: stats.applying_snapshot_count,
        bytes_written_rate: stats.bytes_written_rate,
        bytes_read_rate: stats.bytes_read_rate,
        keys_written_rate: stats.keys_written_rate,
        keys_read_rate: stats.keys_read_rate,
    }
}

pub fn store_stats_from_proto(stats: &pd_proto::StoreStats) -> StoreStats {
    StoreStats {
        capacity: stats.capacity,
        available: stats.available,
        region_count: stats.region_count,
        leader_count: stats.leader_count,
        applying_snapshot_count: stats.applying_snapshot_count,
        bytes_written_rate: stats.bytes_written_rate,
        bytes_read_rate: stats.bytes_read_rate,
        keys_written_rate: stats.keys_written_rate,
        keys_read_rate: stats.keys_read_rate,
    }
}

pub fn store_to_proto(store: &Store) -> pd_proto::Store {
    pd_proto::Store {
        id: store.id.0,
        address: store.address.clone(),
        version: store.version.clone(),
        labels: store.labels.clone(),
        state: store_state_to_proto(store.state),
        stats: Some(store_stats_to_proto(&store.stats)),
        busy: store.busy,
        deploy_path: store.deploy_path.clone(),
        start_timestamp: store.start_timestamp,
        git_hash: store.git_hash.clone(),
    }
}

pub fn store_from_proto(store: &pd_proto::Store) -> Store {
    let mut s = Store::new(StoreId(store.id), store.address.clone());
    s.version = store.version.clone();
    s.labels = store.labels.clone();
    s.state = store_state_from_proto(store.state);
    if let Some(stats) = &store.stats {
        s.stats = store_stats_from_proto(stats);
    }
    s.busy = store.busy;
    s.deploy_path = store.deploy_path.clone();
    s.start_timestamp = store.start_timestamp;
    s.git_hash = store.git_hash.clone();
    s
}

pub fn timestamp_to_proto(ts: Timestamp) -> pd_proto::Timestamp {
    pd_proto::Timestamp { physical_ms: ts.physical_ms, logical: ts.logical }
}

pub fn operator_step_to_proto(step: &OperatorStep) -> pd_proto::region_heartbeat_response::Step {
    match step {
        OperatorStep::AddPeer { peer, store_id } => {
            pd_proto::region_heartbeat_response::Step::AddPeer(pd_proto::AddPeerStep {
                peer: Some(pd_proto::Peer { id: peer.0, store_id: store_id.0 }),
            })
        }
        OperatorStep::RemovePeer { peer } => {
            pd_proto::region_heartbeat_response::Step::RemovePeer(pd_proto::RemovePeerStep {
                peer: Some(pd_proto::Peer { id: peer.0, store_id: 0 }),
            })
        }
        OperatorStep::TransferLeader { from, to } => {
            pd_proto::region_heartbeat_response::Step::TransferLeader(pd_proto::TransferLeaderStep {
                from_peer_id: from.0,
                to_peer_id: to.0,
            })
        }
        OperatorStep::BatchSplit { new_region_ids } => {
            pd_proto::region_heartbeat_response::Step::BatchSplit(pd_proto::BatchSplitStep {
                new_region_ids: new_region_ids.iter().map(|r| r.0).collect(),
            })
        }
    }
}

pub fn schedule_config_to_proto(config: &ScheduleConfig) -> pd_proto::ScheduleConfig {
    pd_proto::ScheduleConfig {
        leader_schedule_limit: config.leader_schedule_limit,
        region_schedule_limit: config.region_schedule_limit,
        replica_schedule_limit: config.replica_schedule_limit,
        hot_region_schedule_limit: config.hot_region_schedule_limit,
        max_store_down_time_secs: config.max_store_down_time_secs,
        max_pending_peer_count: config.max_pending_peer_count,
        low_space_ratio: config.low_space_ratio,
        balance_leader_retry_limit: config.balance_leader_retry_limit,
        schedule_min_interval_ms: config.schedule_min_interval_ms,
        schedule_max_interval_ms: config.schedule_max_interval_ms,
        schedule_backoff_factor: config.schedule_backoff_factor,
        failure_cache_ttl_secs: config.failure_cache_ttl_secs,
    }
}

pub fn schedule_config_from_proto(config: &pd_proto::ScheduleConfig) -> ScheduleConfig {
    ScheduleConfig {
        leader_schedule_limit: config.leader_schedule_limit,
        region_schedule_limit: config.region_schedule_limit,
        replica_schedule_limit: config.replica_schedule_limit,
        hot_region_schedule_limit: config.hot_region_schedule_limit,
        max_store_down_time_secs: config.max_store_down_time_secs,
        max_pending_peer_count: config.max_pending_peer_count,
        low_space_ratio: config.low_space_ratio,
        balance_leader_retry_limit: config.balance_leader_retry_limit,
        schedule_min_interval_ms: config.schedule_min_interval_ms,
        schedule_max_interval_ms: config.schedule_max_interval_ms,
        schedule_backoff_factor: config.schedule_backoff_factor,
        failure_cache_ttl_secs: config.failure_cache_ttl_secs,
    }
}

pub fn replication_config_to_proto(config: &ReplicationConfig) -> pd_proto::ReplicationConfig {
    pd_proto::ReplicationConfig {
        max_replicas: config.max_replicas,
        location_labels: config.location_labels.clone(),
    }
}

pub fn replication_config_from_proto(config: &pd_proto::ReplicationConfig) -> ReplicationConfig {
    ReplicationConfig { max_replicas: config.max_replicas, location_labels: config.location_labels.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd::types::Peer;

    #[test]
    fn region_round_trips_through_proto() {
        let mut region = Region::new(
            RegionId(1),
            b"a".to_vec(),
            b"z".to_vec(),
            vec![Peer { id: PeerId(1), store_id: StoreId(1) }],
        );
        region.leader = Some(PeerId(1));
        region.epoch = RegionEpoch::new(2, 3);

        let proto = region_to_proto(&region);
        let back = region_from_proto(&proto);
        assert_eq!(back.id, region.id);
        assert_eq!(back.leader, region.leader);
        assert_eq!(back.epoch, region.epoch);
        assert_eq!(back.peers, region.peers);
    }

    #[test]
    fn store_round_trips_through_proto() {
        let mut store = Store::new(StoreId(4), "10.0.0.4:20160");
        store.labels.insert("zone".to_string(), "z1".to_string());
        store.state = StoreState::Offline;

        let proto = store_to_proto(&store);
        let back = store_from_proto(&proto);
        assert_eq!(back.id, store.id);
        assert_eq!(back.address, store.address);
        assert_eq!(back.state, store.state);
        assert_eq!(back.label_value("zone"), Some("z1"));
    }
}
