//! The business-logic surface the gRPC adapters in `server.rs` call
//! into. Kept as a trait (rather than calling `pd::Cluster` directly
//! from `server.rs`) so tests can substitute a fake without a durable
//! metadata store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pd::config::{ReplicationConfig, ScheduleConfig};
use pd::operator::OperatorStep;
use pd::region::Region;
use pd::store::{Store, StoreStats};
use pd::types::{RegionId, StoreId, Timestamp};
use pd::PdError;

#[async_trait]
pub trait PdService: Send + Sync {
    async fn bootstrap(&self, store: Store, region: Region) -> Result<(), PdError>;
    async fn is_bootstrapped(&self) -> Result<bool, PdError>;
    async fn alloc_id(&self) -> Result<u64, PdError>;
    async fn alloc_timestamp(&self, count: u32) -> Result<(Timestamp, Timestamp), PdError>;

    async fn get_store(&self, store_id: StoreId) -> Result<Store, PdError>;
    async fn put_store(&self, store: Store) -> Result<(), PdError>;
    async fn remove_store(&self, store_id: StoreId) -> Result<(), PdError>;
    async fn get_all_stores(&self) -> Result<Vec<Store>, PdError>;

    async fn get_region_by_key(&self, key: Vec<u8>) -> Result<Region, PdError>;
    async fn get_region_by_id(&self, region_id: RegionId) -> Result<Region, PdError>;
    async fn scan_regions(&self, start_key: Vec<u8>, limit: u32) -> Result<Vec<Region>, PdError>;

    async fn get_cluster_config(&self) -> Result<(ScheduleConfig, ReplicationConfig), PdError>;
    async fn put_cluster_config(&self, schedule: ScheduleConfig, replication: ReplicationConfig) -> Result<(), PdError>;

    async fn get_operator(&self, region_id: RegionId) -> Result<Option<pd::operator::Operator>, PdError>;
    async fn scatter_region(&self, region_id: RegionId, now: DateTime<Utc>) -> Result<Option<OperatorStep>, PdError>;
    async fn report_split(&self, count: u32) -> Result<Vec<RegionId>, PdError>;

    async fn region_heartbeat(&self, region: Region, now: DateTime<Utc>) -> Result<Option<OperatorStep>, PdError>;
    async fn store_heartbeat(&self, store_id: StoreId, stats: StoreStats, busy: bool, now: DateTime<Utc>) -> Result<(), PdError>;
}
