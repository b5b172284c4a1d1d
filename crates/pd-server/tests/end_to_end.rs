use chrono::Utc;
use pd::config::{ReplicationConfig, ScheduleConfig};
use pd::store::{Store, StoreStats};
use pd::types::{Peer, PeerId, RegionId, StoreId};
use pd_cluster::{PdService, PdServiceImpl};

fn store(id: u64, addr: &str) -> Store {
    Store::new(StoreId(id), addr)
}

#[tokio::test]
async fn bootstrap_activate_heartbeat_dispatches_a_replica_add() {
    let cluster = pd_server::single_node_cluster(1, ScheduleConfig::default(), ReplicationConfig::default()).unwrap();
    let service = PdServiceImpl::new(cluster.clone());

    // Single-node_cluster() already activated the cluster as leader;
    // bootstrap seeds the first store and a one-peer region.
    let region = pd::region::Region::new(RegionId(1), vec![], vec![], vec![Peer { id: PeerId(1), store_id: StoreId(1) }]);
    service.bootstrap(store(1, "10.0.0.1:20160"), region.clone()).await.unwrap();
    assert!(service.is_bootstrapped().await.unwrap());

    // Register two more stores so the replica checker has somewhere
    // to place the missing replicas (replication factor defaults to 3).
    service.put_store(store(2, "10.0.0.2:20160")).await.unwrap();
    service.put_store(store(3, "10.0.0.3:20160")).await.unwrap();
    let now = Utc::now();
    service.store_heartbeat(StoreId(1), StoreStats::default(), false, now).await.unwrap();
    service.store_heartbeat(StoreId(2), StoreStats::default(), false, now).await.unwrap();
    service.store_heartbeat(StoreId(3), StoreStats::default(), false, now).await.unwrap();

    let step = service.region_heartbeat(region, now).await.unwrap();
    assert!(matches!(step, Some(pd::operator::OperatorStep::AddPeer { .. })));

    let operator = service.get_operator(RegionId(1)).await.unwrap();
    assert!(operator.is_some());
}

#[tokio::test]
async fn report_split_mints_fresh_region_ids() {
    let cluster = pd_server::single_node_cluster(2, ScheduleConfig::default(), ReplicationConfig::default()).unwrap();
    let service = PdServiceImpl::new(cluster);
    let region = pd::region::Region::new(RegionId(1), vec![], vec![], vec![Peer { id: PeerId(1), store_id: StoreId(1) }]);
    service.bootstrap(store(1, "10.0.0.1:20160"), region).await.unwrap();

    let ids = service.report_split(2).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}
