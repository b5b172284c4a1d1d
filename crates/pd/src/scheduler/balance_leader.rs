//! balance-leader (§4.4.1): moves leaders from over-loaded to
//! under-loaded stores via `TransferLeader`.

use crate::operator::{Operator, OperatorInfluence, OperatorKind, OperatorStep};
use crate::scheduler::common::{imbalance_tolerance, Scheduler, SchedulerContext, SchedulerKind};
use crate::types::StoreId;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;

pub struct BalanceLeaderScheduler {
    retry_limit: u32,
}

impl BalanceLeaderScheduler {
    pub fn new(retry_limit: u32) -> Self {
        Self { retry_limit: retry_limit.max(1) }
    }

    fn effective_leader_count(&self, ctx: &SchedulerContext, store: StoreId) -> i64 {
        let region_count = ctx.region_cache.leader_count(store) as i64;
        region_count + ctx.operator_controller.op_influence(store).leader_delta
    }
}

impl Scheduler for BalanceLeaderScheduler {
    fn name(&self) -> &str {
        "balance-leader"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Leader
    }

    fn allowed(&self, ctx: &SchedulerContext) -> bool {
        ctx.operator_controller.count(OperatorKind::TransferLeader) < ctx.config.leader_schedule_limit
    }

    fn schedule(&self, ctx: &SchedulerContext, now: DateTime<Utc>) -> Vec<Operator> {
        let mut scores: Vec<(StoreId, i64)> = ctx
            .store_cache
            .list()
            .into_iter()
            .filter(|s| ctx.store_cache.filter(s.id, now).is_ok())
            .map(|s| (s.id, self.effective_leader_count(ctx, s.id)))
            .collect();
        if scores.len() < 2 {
            return Vec::new();
        }
        scores.sort_by_key(|(_, score)| *score);

        let mut rng = rand::thread_rng();
        let mut attempts = 0u32;
        for &(target, target_score) in scores.iter() {
            for &(source, source_score) in scores.iter().rev() {
                if source == target || attempts >= self.retry_limit {
                    continue;
                }
                let diff = (source_score - target_score) as f64;
                let tolerance = imbalance_tolerance(source_score.max(0) as u64, target_score.max(0) as u64);
                if diff <= tolerance {
                    continue;
                }
                attempts += 1;

                let mut candidates: Vec<_> = ctx
                    .region_cache
                    .leader_regions_on(source)
                    .into_iter()
                    .filter(|r| !ctx.region_cache.is_hot(r.id))
                    .filter(|r| r.peers.iter().any(|p| p.store_id == target))
                    .collect();
                candidates.shuffle(&mut rng);

                if let Some(region) = candidates.into_iter().next() {
                    let from = region.leader.expect("leader_regions_on guarantees a leader");
                    let to = region
                        .peers
                        .iter()
                        .find(|p| p.store_id == target)
                        .expect("filtered above")
                        .id;

                    let mut influence = HashMap::new();
                    influence.insert(source, OperatorInfluence { leader_delta: -1, region_size_delta: 0 });
                    influence.insert(target, OperatorInfluence { leader_delta: 1, region_size_delta: 0 });

                    return vec![Operator::new(
                        region.id,
                        OperatorKind::TransferLeader,
                        vec![OperatorStep::TransferLeader { from, to }],
                        now,
                    )
                    .with_influence(influence)
                    .with_epoch(region.epoch)];
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::operator_controller::{OperatorController, ScheduleLimits};
    use crate::region::Region;
    use crate::store::{Store, StoreCache, StoreStats};
    use crate::types::{Peer, PeerId, RegionId};
    use std::sync::Arc;

    fn setup(leader_counts: &[(u64, u64)]) -> (SchedulerContext, RegionId) {
        let md: Arc<InMemoryMetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let store_cache = Arc::new(StoreCache::new(1, md.clone()));
        let region_cache = Arc::new(crate::region::RegionCache::new(1, md));
        let operator_controller = Arc::new(OperatorController::new(ScheduleLimits::default()));

        let mut peers = Vec::new();
        for &(id, _) in leader_counts {
            let mut s = Store::new(StoreId(id), format!("10.0.0.{id}:20160"));
            s.stats = StoreStats { capacity: 100, available: 80, ..Default::default() };
            store_cache.put(s).unwrap();
            store_cache
                .handle_store_heartbeat(StoreId(id), StoreStats { capacity: 100, available: 80, ..Default::default() }, false, Utc::now())
                .unwrap();
            peers.push(Peer { id: PeerId(id), store_id: StoreId(id) });
        }

        let leader_store = leader_counts.iter().max_by_key(|(_, c)| *c).unwrap().0;
        let mut region = Region::new(RegionId(1), vec![], vec![], peers);
        region.leader = Some(PeerId(leader_store));
        region_cache.set_region(region).unwrap();

        // Pad each store's leader_count index via repeated dummy regions
        // so `leader_count()` reflects the requested skew.
        let mut next_region_id = 2u64;
        for &(id, count) in leader_counts {
            let extra = count.saturating_sub(if id == leader_store { 1 } else { 0 });
            for _ in 0..extra {
                let r = Region::new(
                    RegionId(next_region_id),
                    format!("k{next_region_id}").into_bytes(),
                    format!("k{}", next_region_id + 1).into_bytes(),
                    vec![Peer { id: PeerId(next_region_id), store_id: StoreId(id) }],
                );
                let mut r = r;
                r.leader = Some(PeerId(next_region_id));
                region_cache.set_region(r).unwrap();
                next_region_id += 1;
            }
        }

        let ctx = SchedulerContext {
            store_cache,
            region_cache,
            operator_controller,
            config: ScheduleConfig::default(),
            replication: crate::config::ReplicationConfig::default(),
        };
        (ctx, RegionId(1))
    }

    #[test]
    fn s1_transfers_leader_from_hottest_to_coolest_eligible_store() {
        let (ctx, region_id) = setup(&[(1, 7), (2, 8), (3, 9), (4, 16)]);
        let scheduler = BalanceLeaderScheduler::new(10);
        let ops = scheduler.schedule(&ctx, Utc::now());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].region_id, region_id);
        match ops[0].steps[0] {
            OperatorStep::TransferLeader { from, to } => {
                assert_eq!(from, PeerId(4));
                assert_eq!(to, PeerId(1));
            }
            _ => panic!("expected TransferLeader"),
        }
    }

    #[test]
    fn s2_skips_down_store_and_picks_next_coolest() {
        let (ctx, _region_id) = setup(&[(1, 7), (2, 8), (3, 9), (4, 16)]);
        // Simulate store 1 being unavailable: excluded by the filter chain.
        ctx.store_cache.block_store(StoreId(1));
        let scheduler = BalanceLeaderScheduler::new(10);
        let ops = scheduler.schedule(&ctx, Utc::now());
        assert_eq!(ops.len(), 1);
        match ops[0].steps[0] {
            OperatorStep::TransferLeader { from, to } => {
                assert_eq!(from, PeerId(4));
                assert_eq!(to, PeerId(2));
            }
            _ => panic!("expected TransferLeader"),
        }
    }
}
