//! Cluster (§2, §9): the top-level glue object. One per process, passed
//! by reference rather than kept as a singleton, so tests can run
//! several isolated clusters side by side.

use crate::config::{ReplicationConfig, ScheduleConfig};
use crate::coordinator::Coordinator;
use crate::error::PdError;
use crate::id::IdAllocator;
use crate::metadata_store::{keys, MetadataStore};
use crate::operator::OperatorStep;
use crate::operator_controller::{OperatorController, ScheduleLimits};
use crate::region::{Region, RegionCache};
use crate::replica_checker::ReplicaChecker;
use crate::scheduler::default_schedulers;
use crate::store::{Store, StoreCache};
use crate::tso::{Clock, TimestampOracle};
use crate::types::StoreId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

const ID_BATCH_SIZE: u64 = 1000;

pub struct Cluster {
    cluster_id: u64,
    metadata_store: Arc<dyn MetadataStore>,
    store_cache: Arc<StoreCache>,
    region_cache: Arc<RegionCache>,
    operator_controller: Arc<OperatorController>,
    replica_checker: Arc<ReplicaChecker>,
    id_allocator: Arc<IdAllocator>,
    tso: Arc<TimestampOracle>,
    coordinator: RwLock<Option<Arc<Coordinator>>>,
    schedule_config: RwLock<ScheduleConfig>,
    replication_config: RwLock<ReplicationConfig>,
}

impl Cluster {
    pub fn new(
        cluster_id: u64,
        metadata_store: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
        schedule_config: ScheduleConfig,
        replication_config: ReplicationConfig,
    ) -> Self {
        let store_cache = Arc::new(StoreCache::new(cluster_id, metadata_store.clone()));
        let region_cache = Arc::new(RegionCache::new(cluster_id, metadata_store.clone()));
        let operator_controller = Arc::new(OperatorController::new(ScheduleLimits {
            leader_schedule_limit: schedule_config.leader_schedule_limit,
            region_schedule_limit: schedule_config.region_schedule_limit,
            replica_schedule_limit: schedule_config.replica_schedule_limit,
            hot_region_schedule_limit: schedule_config.hot_region_schedule_limit,
        }));
        let replica_checker = Arc::new(ReplicaChecker::new(
            store_cache.clone(),
            region_cache.clone(),
            replication_config.clone(),
            schedule_config.max_store_down_time(),
        ));
        let id_allocator = Arc::new(IdAllocator::new(metadata_store.clone(), keys::alloc_id(cluster_id), ID_BATCH_SIZE));
        let tso = Arc::new(TimestampOracle::new(metadata_store.clone(), keys::timestamp(cluster_id), clock));

        Self {
            cluster_id,
            metadata_store,
            store_cache,
            region_cache,
            operator_controller,
            replica_checker,
            id_allocator,
            tso,
            coordinator: RwLock::new(None),
            schedule_config: RwLock::new(schedule_config),
            replication_config: RwLock::new(replication_config),
        }
    }

    pub fn is_bootstrapped(&self) -> Result<bool, PdError> {
        Ok(self.metadata_store.get(&keys::bootstrap(self.cluster_id))?.is_some())
    }

    pub fn bootstrap(&self, first_store: Store, first_region: Region) -> Result<(), PdError> {
        if self.is_bootstrapped()? {
            return Err(PdError::AlreadyBootstrapped);
        }
        self.store_cache.put(first_store)?;
        self.region_cache.set_region(first_region)?;
        self.metadata_store.put(&keys::bootstrap(self.cluster_id), vec![1])?;
        Ok(())
    }

    /// Starts TSO and the coordinator. Called once this replica wins
    /// the durable-store leader election (§5 leader-only activation).
    pub fn activate_as_leader(&self, now: DateTime<Utc>) -> Result<(), PdError> {
        self.tso.load_and_init()?;
        let schedule_config = self.schedule_config.read().clone();
        let replication_config = self.replication_config.read().clone();
        let coordinator = Arc::new(Coordinator::new(
            self.store_cache.clone(),
            self.region_cache.clone(),
            self.replica_checker.clone(),
            self.operator_controller.clone(),
            default_schedulers(schedule_config.balance_leader_retry_limit),
            schedule_config,
            replication_config,
            now,
        ));
        *self.coordinator.write() = Some(coordinator);
        Ok(())
    }

    /// Stops the coordinator immediately on leader loss (§5).
    pub fn deactivate(&self) {
        *self.coordinator.write() = None;
    }

    pub fn is_leader(&self) -> bool {
        self.coordinator.read().is_some()
    }

    fn coordinator(&self) -> Result<Arc<Coordinator>, PdError> {
        self.coordinator.read().clone().ok_or(PdError::NotLeader { leader_hint: None })
    }

    pub fn alloc_id(&self) -> Result<u64, PdError> {
        if !self.is_leader() {
            return Err(PdError::NotLeader { leader_hint: None });
        }
        self.id_allocator.alloc()
    }

    pub fn alloc_timestamp(&self, count: u32) -> Result<(crate::types::Timestamp, crate::types::Timestamp), PdError> {
        self.tso.alloc(count)
    }

    pub fn region_heartbeat(&self, region: Region, now: DateTime<Utc>) -> Result<Option<OperatorStep>, PdError> {
        let coordinator = self.coordinator()?;
        Ok(coordinator.dispatch(region, now))
    }

    pub fn store_heartbeat(
        &self,
        store_id: StoreId,
        stats: crate::store::StoreStats,
        busy: bool,
        now: DateTime<Utc>,
    ) -> Result<(), PdError> {
        self.store_cache.handle_store_heartbeat(store_id, stats, busy, now)
    }

    pub fn tick_schedulers(&self, now: DateTime<Utc>) -> Result<usize, PdError> {
        Ok(self.coordinator()?.tick_schedulers(now).len())
    }

    pub fn run_background_jobs(&self, now: DateTime<Utc>) -> Result<(), PdError> {
        self.coordinator()?.run_background_jobs(now);
        Ok(())
    }

    pub fn store_cache(&self) -> &Arc<StoreCache> {
        &self.store_cache
    }

    pub fn region_cache(&self) -> &Arc<RegionCache> {
        &self.region_cache
    }

    pub fn operator_controller(&self) -> &Arc<OperatorController> {
        &self.operator_controller
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        self.schedule_config.read().clone()
    }

    pub fn replication_config(&self) -> ReplicationConfig {
        self.replication_config.read().clone()
    }

    /// `PutClusterConfig`: takes effect on the next `activate_as_leader`
    /// (a running coordinator keeps the tunables it was built with).
    pub fn set_schedule_config(&self, config: ScheduleConfig) {
        *self.schedule_config.write() = config;
    }

    pub fn set_replication_config(&self, config: ReplicationConfig) {
        *self.replication_config.write() = config;
    }

    /// `ScatterRegion`: re-runs the dispatch protocol against the
    /// region's last known heartbeat state, without waiting for the
    /// store to report in again.
    pub fn scatter_region(&self, region_id: crate::types::RegionId, now: DateTime<Utc>) -> Result<Option<OperatorStep>, PdError> {
        let coordinator = self.coordinator()?;
        let region = self.region_cache.get(region_id).ok_or(PdError::RegionNotFound { region_id })?;
        Ok(coordinator.dispatch(region, now))
    }

    /// `ReportSplit`: mints `count` fresh region ids for a region that
    /// has just split (§6 AMBIENT-7 collapses Ask{,Batch}Split/
    /// Report{,Batch}Split into this one call).
    pub fn report_split(&self, count: u32) -> Result<Vec<crate::types::RegionId>, PdError> {
        (0..count).map(|_| self.id_allocator.alloc().map(crate::types::RegionId)).collect()
    }
}
