//! Shared scheduler shape (§4.4): the `Scheduler` trait, the failure
//! cache, and the context handed to every scheduler tick.

use crate::config::{ReplicationConfig, ScheduleConfig};
use crate::operator::Operator;
use crate::operator_controller::OperatorController;
use crate::region::RegionCache;
use crate::store::StoreCache;
use crate::types::StoreId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Leader,
    Region,
    Other,
}

/// Read-only handles a scheduler needs to produce candidate operators.
/// Mirrors what `Coordinator` hands each `ScheduleController` on tick.
pub struct SchedulerContext {
    pub store_cache: Arc<StoreCache>,
    pub region_cache: Arc<RegionCache>,
    pub operator_controller: Arc<OperatorController>,
    pub config: ScheduleConfig,
    pub replication: ReplicationConfig,
}

/// `(store_id → deadline)`: sources/targets that recently failed to
/// yield a useful operator are skipped until their cooldown lapses.
pub struct FailureCache {
    entries: RwLock<HashMap<StoreId, DateTime<Utc>>>,
    ttl: Duration,
}

impl FailureCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    pub fn mark(&self, store: StoreId, now: DateTime<Utc>) {
        let deadline = now + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        self.entries.write().insert(store, deadline);
    }

    pub fn is_active(&self, store: StoreId, now: DateTime<Utc>) -> bool {
        self.entries.read().get(&store).map(|deadline| *deadline > now).unwrap_or(false)
    }

    pub fn prune(&self, now: DateTime<Utc>) {
        self.entries.write().retain(|_, deadline| *deadline > now);
    }
}

pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SchedulerKind;
    fn allowed(&self, ctx: &SchedulerContext) -> bool;
    fn schedule(&self, ctx: &SchedulerContext, now: DateTime<Utc>) -> Vec<Operator>;

    fn prepare(&self, _ctx: &SchedulerContext) {}
    fn cleanup(&self, _ctx: &SchedulerContext) {}
}

/// §4.4 tolerance: the imbalance must exceed the natural spread implied
/// by sample size, with a hard floor so tiny clusters don't thrash.
pub fn imbalance_tolerance(count_a: u64, count_b: u64) -> f64 {
    (count_a.max(count_b) as f64).sqrt().max(2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_cache_entries_expire() {
        let cache = FailureCache::new(Duration::from_secs(1));
        let t0 = Utc::now();
        cache.mark(StoreId(1), t0);
        assert!(cache.is_active(StoreId(1), t0));
        assert!(!cache.is_active(StoreId(1), t0 + chrono::Duration::seconds(2)));
    }

    #[test]
    fn tolerance_has_a_floor_of_two() {
        assert_eq!(imbalance_tolerance(1, 1), 2.0);
        assert_eq!(imbalance_tolerance(16, 7), 4.0);
    }
}
