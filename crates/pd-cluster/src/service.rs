//! Default `PdService` implementation: a thin async wrapper over the
//! synchronous `pd::Cluster`.

use crate::traits::PdService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pd::config::{ReplicationConfig, ScheduleConfig};
use pd::operator::{Operator, OperatorStep};
use pd::region::Region;
use pd::store::{Store, StoreStats};
use pd::types::{RegionId, StoreId, Timestamp};
use pd::{Cluster, PdError};
use std::sync::Arc;

pub struct PdServiceImpl {
    cluster: Arc<Cluster>,
}

impl PdServiceImpl {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }
}

#[async_trait]
impl PdService for PdServiceImpl {
    async fn bootstrap(&self, store: Store, region: Region) -> Result<(), PdError> {
        self.cluster.bootstrap(store, region)
    }

    async fn is_bootstrapped(&self) -> Result<bool, PdError> {
        self.cluster.is_bootstrapped()
    }

    async fn alloc_id(&self) -> Result<u64, PdError> {
        self.cluster.alloc_id()
    }

    async fn alloc_timestamp(&self, count: u32) -> Result<(Timestamp, Timestamp), PdError> {
        self.cluster.alloc_timestamp(count)
    }

    async fn get_store(&self, store_id: StoreId) -> Result<Store, PdError> {
        self.cluster.store_cache().get(store_id)
    }

    async fn put_store(&self, store: Store) -> Result<(), PdError> {
        self.cluster.store_cache().put(store)
    }

    async fn remove_store(&self, store_id: StoreId) -> Result<(), PdError> {
        self.cluster.store_cache().remove_store(store_id)
    }

    async fn get_all_stores(&self) -> Result<Vec<Store>, PdError> {
        Ok(self.cluster.store_cache().list())
    }

    async fn get_region_by_key(&self, key: Vec<u8>) -> Result<Region, PdError> {
        self.cluster
            .region_cache()
            .get_by_key(&key)
            .ok_or(PdError::RegionNotFound { region_id: RegionId(0) })
    }

    async fn get_region_by_id(&self, region_id: RegionId) -> Result<Region, PdError> {
        self.cluster.region_cache().get(region_id).ok_or(PdError::RegionNotFound { region_id })
    }

    async fn scan_regions(&self, start_key: Vec<u8>, limit: u32) -> Result<Vec<Region>, PdError> {
        let mut regions: Vec<Region> = self
            .cluster
            .region_cache()
            .list()
            .into_iter()
            .filter(|r| r.start_key.as_slice() >= start_key.as_slice())
            .collect();
        regions.sort_by(|a, b| a.start_key.cmp(&b.start_key));
        regions.truncate(limit.max(1) as usize);
        Ok(regions)
    }

    async fn get_cluster_config(&self) -> Result<(ScheduleConfig, ReplicationConfig), PdError> {
        Ok((self.cluster.schedule_config(), self.cluster.replication_config()))
    }

    async fn put_cluster_config(&self, schedule: ScheduleConfig, replication: ReplicationConfig) -> Result<(), PdError> {
        self.cluster.set_schedule_config(schedule);
        self.cluster.set_replication_config(replication);
        Ok(())
    }

    async fn get_operator(&self, region_id: RegionId) -> Result<Option<Operator>, PdError> {
        Ok(self.cluster.operator_controller().get(region_id))
    }

    async fn scatter_region(&self, region_id: RegionId, now: DateTime<Utc>) -> Result<Option<OperatorStep>, PdError> {
        self.cluster.scatter_region(region_id, now)
    }

    async fn report_split(&self, count: u32) -> Result<Vec<RegionId>, PdError> {
        self.cluster.report_split(count)
    }

    async fn region_heartbeat(&self, region: Region, now: DateTime<Utc>) -> Result<Option<OperatorStep>, PdError> {
        self.cluster.region_heartbeat(region, now)
    }

    async fn store_heartbeat(&self, store_id: StoreId, stats: StoreStats, busy: bool, now: DateTime<Utc>) -> Result<(), PdError> {
        self.cluster.store_heartbeat(store_id, stats, busy, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd::metadata_store::InMemoryMetadataStore;
    use pd::tso::FixedClock;
    use pd::types::{Peer, PeerId};

    fn service() -> PdServiceImpl {
        let md = Arc::new(InMemoryMetadataStore::new());
        let clock = Arc::new(FixedClock::new(1_000));
        let cluster = Arc::new(Cluster::new(1, md, clock, ScheduleConfig::default(), ReplicationConfig::default()));
        PdServiceImpl::new(cluster)
    }

    #[tokio::test]
    async fn bootstrap_then_get_store_round_trips() {
        let service = service();
        let store = Store::new(StoreId(1), "10.0.0.1:20160");
        let region = Region::new(RegionId(1), vec![], vec![], vec![Peer { id: PeerId(1), store_id: StoreId(1) }]);
        service.bootstrap(store, region).await.unwrap();

        assert!(service.is_bootstrapped().await.unwrap());
        let fetched = service.get_store(StoreId(1)).await.unwrap();
        assert_eq!(fetched.address, "10.0.0.1:20160");
    }

    #[tokio::test]
    async fn region_heartbeat_is_rejected_before_leader_activation() {
        let service = service();
        let region = Region::new(RegionId(1), vec![], vec![], vec![Peer { id: PeerId(1), store_id: StoreId(1) }]);
        let err = service.region_heartbeat(region, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PdError::NotLeader { .. }));
    }
}
