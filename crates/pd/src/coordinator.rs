//! Coordinator (§4.6): owns the schedulers, drives them on back-off
//! timers, dispatches region heartbeats, and runs background jobs.
//! Only instantiated on the replica currently holding PD leadership.

use crate::config::{ReplicationConfig, ScheduleConfig};
use crate::operator::{Operator, OperatorStep};
use crate::operator_controller::OperatorController;
use crate::region::{Region, RegionCache};
use crate::replica_checker::ReplicaChecker;
use crate::scheduler::{Scheduler, SchedulerContext};
use crate::store::{StoreCache, StoreState};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct ScheduleController {
    interval: Duration,
    next_run_at: DateTime<Utc>,
}

impl ScheduleController {
    fn new(min_interval: Duration, now: DateTime<Utc>) -> Self {
        Self { interval: min_interval, next_run_at: now }
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_run_at
    }

    fn on_success(&mut self, min_interval: Duration, now: DateTime<Utc>) {
        self.interval = min_interval;
        self.next_run_at = now + chrono::Duration::from_std(min_interval).unwrap_or(chrono::Duration::zero());
    }

    fn on_empty(&mut self, max_interval: Duration, factor: f64, now: DateTime<Utc>) {
        let grown = self.interval.mul_f64(factor).min(max_interval);
        self.interval = grown;
        self.next_run_at = now + chrono::Duration::from_std(grown).unwrap_or(chrono::Duration::zero());
    }
}

pub struct Coordinator {
    store_cache: Arc<StoreCache>,
    region_cache: Arc<RegionCache>,
    replica_checker: Arc<ReplicaChecker>,
    operator_controller: Arc<OperatorController>,
    schedulers: Vec<Box<dyn Scheduler>>,
    controllers: RwLock<HashMap<String, ScheduleController>>,
    config: ScheduleConfig,
    replication: ReplicationConfig,
}

impl Coordinator {
    pub fn new(
        store_cache: Arc<StoreCache>,
        region_cache: Arc<RegionCache>,
        replica_checker: Arc<ReplicaChecker>,
        operator_controller: Arc<OperatorController>,
        schedulers: Vec<Box<dyn Scheduler>>,
        config: ScheduleConfig,
        replication: ReplicationConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let mut controllers = HashMap::new();
        for scheduler in &schedulers {
            controllers.insert(scheduler.name().to_string(), ScheduleController::new(config.min_interval(), now));
        }
        Self {
            store_cache,
            region_cache,
            replica_checker,
            operator_controller,
            schedulers,
            controllers: RwLock::new(controllers),
            config,
            replication,
        }
    }

    /// §4.6 dispatch: accept the heartbeat, then either continue an
    /// in-flight operator or consult the replica checker.
    pub fn dispatch(&self, heartbeat_region: Region, now: DateTime<Utc>) -> Option<OperatorStep> {
        let region_id = heartbeat_region.id;
        if let Err(err) = self.region_cache.set_region(heartbeat_region) {
            log::warn!("heartbeat rejected for region {region_id}: {err}");
            return None;
        }

        let region = self.region_cache.get(region_id)?;

        let (_, step) = self.operator_controller.check(&region, now);
        if step.is_some() {
            return step;
        }

        let op = self.replica_checker.check(&region, now)?;
        let first_step = op.current().cloned();
        self.operator_controller.add(op).ok()?;
        first_step
    }

    fn context(&self) -> SchedulerContext {
        SchedulerContext {
            store_cache: self.store_cache.clone(),
            region_cache: self.region_cache.clone(),
            operator_controller: self.operator_controller.clone(),
            config: self.config.clone(),
            replication: self.replication.clone(),
        }
    }

    /// Runs each due, allowed scheduler once; admits whatever operators
    /// it proposes and adjusts its back-off interval.
    pub fn tick_schedulers(&self, now: DateTime<Utc>) -> Vec<Operator> {
        let ctx = self.context();
        let mut admitted = Vec::new();

        for scheduler in &self.schedulers {
            if !scheduler.allowed(&ctx) {
                continue;
            }
            let due = {
                let controllers = self.controllers.read();
                controllers.get(scheduler.name()).map(|c| c.due(now)).unwrap_or(true)
            };
            if !due {
                continue;
            }

            let ops = scheduler.schedule(&ctx, now);
            let mut controllers = self.controllers.write();
            let controller = controllers.entry(scheduler.name().to_string()).or_insert_with(|| {
                ScheduleController::new(self.config.min_interval(), now)
            });

            if ops.is_empty() {
                controller.on_empty(self.config.max_interval(), self.config.schedule_backoff_factor, now);
                continue;
            }
            controller.on_success(self.config.min_interval(), now);

            for op in ops {
                if self.operator_controller.add(op.clone()).is_ok() {
                    admitted.push(op);
                }
            }
        }
        admitted
    }

    /// Once-a-minute sweep: retire timed-out operators and bury
    /// zero-region offline stores.
    pub fn run_background_jobs(&self, now: DateTime<Utc>) {
        for region_id in self.operator_controller.active_region_ids() {
            let Some(region) = self.region_cache.get(region_id) else {
                self.operator_controller.remove(region_id);
                continue;
            };
            self.operator_controller.check(&region, now);
        }

        for store in self.store_cache.list() {
            if store.state == StoreState::Offline && store.stats.region_count == 0 {
                if let Err(err) = self.store_cache.bury_store(store.id, false) {
                    log::warn!("failed to bury offline store {}: {err}", store.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::operator_controller::ScheduleLimits;
    use crate::store::{Store, StoreStats};
    use crate::types::{Peer, PeerId, RegionId, RegionEpoch, StoreId};

    fn coordinator() -> (Coordinator, Arc<StoreCache>, Arc<RegionCache>) {
        let md: Arc<InMemoryMetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let store_cache = Arc::new(StoreCache::new(1, md.clone()));
        let region_cache = Arc::new(RegionCache::new(1, md));
        let replication = ReplicationConfig::default();
        let replica_checker = Arc::new(ReplicaChecker::new(
            store_cache.clone(),
            region_cache.clone(),
            replication.clone(),
            Duration::from_secs(30 * 60),
        ));
        let operator_controller = Arc::new(OperatorController::new(ScheduleLimits {
            region_schedule_limit: 10,
            replica_schedule_limit: 10,
            leader_schedule_limit: 10,
            hot_region_schedule_limit: 10,
        }));
        let coordinator = Coordinator::new(
            store_cache.clone(),
            region_cache.clone(),
            replica_checker,
            operator_controller,
            vec![],
            ScheduleConfig::default(),
            replication,
            Utc::now(),
        );
        (coordinator, store_cache, region_cache)
    }

    #[test]
    fn dispatch_rejects_stale_heartbeat_with_empty_response() {
        let (coordinator, _stores, region_cache) = coordinator();
        let mut r = Region::new(RegionId(1), vec![], vec![], vec![Peer { id: PeerId(1), store_id: StoreId(1) }]);
        r.epoch = RegionEpoch::new(2, 2);
        region_cache.set_region(r).unwrap();

        let mut stale = Region::new(RegionId(1), vec![], vec![], vec![Peer { id: PeerId(1), store_id: StoreId(1) }]);
        stale.epoch = RegionEpoch::new(1, 1);
        let response = coordinator.dispatch(stale, Utc::now());
        assert!(response.is_none());
        assert_eq!(region_cache.get(RegionId(1)).unwrap().epoch, RegionEpoch::new(2, 2));
    }

    #[test]
    fn dispatch_invokes_replica_checker_when_no_operator_active() {
        let (coordinator, stores, _region_cache) = coordinator();
        for id in 1..=4u64 {
            let mut s = Store::new(StoreId(id), format!("10.0.0.{id}:20160"));
            s.stats = StoreStats { capacity: 100, available: 80, ..Default::default() };
            stores.put(s).unwrap();
            stores
                .handle_store_heartbeat(StoreId(id), StoreStats { capacity: 100, available: 80, ..Default::default() }, false, Utc::now())
                .unwrap();
        }

        let region = Region::new(
            RegionId(1),
            vec![],
            vec![],
            vec![Peer { id: PeerId(1), store_id: StoreId(1) }, Peer { id: PeerId(2), store_id: StoreId(2) }],
        );
        let response = coordinator.dispatch(region, Utc::now());
        assert!(matches!(response, Some(crate::operator::OperatorStep::AddPeer { .. })));
    }

    #[test]
    fn background_job_buries_empty_offline_store() {
        let (coordinator, stores, _region_cache) = coordinator();
        stores.put(Store::new(StoreId(1), "a")).unwrap();
        stores.remove_store(StoreId(1)).unwrap();
        coordinator.run_background_jobs(Utc::now());
        assert_eq!(stores.get(StoreId(1)).unwrap().state, StoreState::Tombstone);
    }
}
