//! balance-region (§4.4.2): moves replicas from over-loaded to
//! under-loaded stores via an `AddPeer` + `RemovePeer` migration,
//! prefixed with a `TransferLeader` when the source peer is the leader.

use crate::operator::{Operator, OperatorInfluence, OperatorKind, OperatorStep};
use crate::replica_checker::distinct_score;
use crate::scheduler::common::{imbalance_tolerance, Scheduler, SchedulerContext, SchedulerKind};
use crate::types::{PeerId, StoreId};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};

pub struct BalanceRegionScheduler;

impl BalanceRegionScheduler {
    pub fn new() -> Self {
        Self
    }

    fn region_score(&self, ctx: &SchedulerContext, store: StoreId) -> f64 {
        ctx.store_cache
            .get(store)
            .map(|s| s.region_score())
            .unwrap_or(f64::INFINITY)
            + ctx.operator_controller.op_influence(store).region_size_delta as f64
    }
}

impl Default for BalanceRegionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for BalanceRegionScheduler {
    fn name(&self) -> &str {
        "balance-region"
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Region
    }

    fn allowed(&self, ctx: &SchedulerContext) -> bool {
        ctx.operator_controller.count(OperatorKind::Region) < ctx.config.region_schedule_limit
    }

    fn schedule(&self, ctx: &SchedulerContext, now: DateTime<Utc>) -> Vec<Operator> {
        let mut sources: Vec<StoreId> = ctx
            .store_cache
            .list()
            .into_iter()
            .filter(|s| ctx.store_cache.filter(s.id, now).is_ok())
            .map(|s| s.id)
            .collect();
        sources.sort_by(|a, b| self.region_score(ctx, *b).partial_cmp(&self.region_score(ctx, *a)).unwrap());

        let mut rng = rand::thread_rng();

        for source in sources {
            let mut regions = ctx.region_cache.regions_on(source);
            regions.shuffle(&mut rng);

            for region in regions {
                if ctx.region_cache.is_hot(region.id) {
                    continue;
                }
                let occupied: HashSet<StoreId> = region.peers.iter().map(|p| p.store_id).collect();
                let peer_labels: Vec<Vec<String>> = region
                    .peers
                    .iter()
                    .filter(|p| p.store_id != source)
                    .map(|p| {
                        ctx.replication
                            .location_labels
                            .iter()
                            .map(|k| ctx.store_cache.get(p.store_id).ok().and_then(|s| s.label_value(k).map(str::to_string)).unwrap_or_default())
                            .collect()
                    })
                    .collect();

                let target = ctx
                    .store_cache
                    .list()
                    .into_iter()
                    .filter(|s| !occupied.contains(&s.id))
                    .filter(|s| ctx.store_cache.filter(s.id, now).is_ok())
                    .map(|s| {
                        let labels: Vec<String> = ctx
                            .replication
                            .location_labels
                            .iter()
                            .map(|k| s.label_value(k).unwrap_or("").to_string())
                            .collect();
                        let score = distinct_score(&labels, &ctx.replication.location_labels, &peer_labels);
                        (s.id, score, self.region_score(ctx, s.id))
                    })
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(b.2.partial_cmp(&a.2).unwrap()));

                let Some((target_id, _, target_score)) = target else {
                    continue;
                };

                let source_score = self.region_score(ctx, source);
                let tolerance = imbalance_tolerance(source_score as u64, target_score as u64);
                if source_score - target_score <= tolerance {
                    continue;
                }

                let new_peer_id = region.peers.iter().map(|p| p.id.0).max().unwrap_or(0) + 1;
                let mut steps = Vec::new();
                if region.leader == region.peers.iter().find(|p| p.store_id == source).map(|p| p.id) {
                    if let Some(replacement_leader) = region.peers.iter().find(|p| p.store_id != source) {
                        steps.push(OperatorStep::TransferLeader { from: region.leader.unwrap(), to: replacement_leader.id });
                    }
                }
                let removed_peer = region.peers.iter().find(|p| p.store_id == source).map(|p| p.id);
                steps.push(OperatorStep::AddPeer { peer: PeerId(new_peer_id), store_id: target_id });
                if let Some(removed) = removed_peer {
                    steps.push(OperatorStep::RemovePeer { peer: removed });
                }

                let mut influence = HashMap::new();
                influence.insert(target_id, OperatorInfluence { leader_delta: 0, region_size_delta: 1 });
                influence.insert(source, OperatorInfluence { leader_delta: 0, region_size_delta: -1 });

                return vec![Operator::new(region.id, OperatorKind::Region, steps, now).with_influence(influence).with_epoch(region.epoch)];
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplicationConfig, ScheduleConfig};
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::operator_controller::{OperatorController, ScheduleLimits};
    use crate::region::{Region, RegionCache};
    use crate::store::{Store, StoreCache, StoreStats};
    use crate::types::{Peer, RegionId};
    use std::sync::Arc;

    fn put_store(cache: &StoreCache, id: u64, region_count: u64) {
        let mut s = Store::new(StoreId(id), format!("10.0.0.{id}:20160"));
        s.stats = StoreStats { capacity: 100, available: 80, region_count, ..Default::default() };
        cache.put(s).unwrap();
        cache
            .handle_store_heartbeat(
                StoreId(id),
                StoreStats { capacity: 100, available: 80, region_count, ..Default::default() },
                false,
                Utc::now(),
            )
            .unwrap();
    }

    #[test]
    fn migrates_a_replica_off_the_most_loaded_store() {
        let md: Arc<InMemoryMetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let store_cache = Arc::new(StoreCache::new(1, md.clone()));
        let region_cache = Arc::new(RegionCache::new(1, md));

        put_store(&store_cache, 1, 50);
        put_store(&store_cache, 2, 5);
        put_store(&store_cache, 3, 5);

        let mut region = Region::new(
            RegionId(1),
            vec![],
            vec![],
            vec![Peer { id: PeerId(1), store_id: StoreId(1) }, Peer { id: PeerId(2), store_id: StoreId(2) }],
        );
        region.leader = Some(PeerId(2));
        region_cache.set_region(region).unwrap();

        let ctx = SchedulerContext {
            store_cache,
            region_cache,
            operator_controller: Arc::new(OperatorController::new(ScheduleLimits::default())),
            config: ScheduleConfig::default(),
            replication: ReplicationConfig::default(),
        };

        let scheduler = BalanceRegionScheduler::new();
        let ops = scheduler.schedule(&ctx, Utc::now());
        assert_eq!(ops.len(), 1);
        let op = &ops[0];
        assert!(matches!(op.steps.first(), Some(OperatorStep::AddPeer { store_id: StoreId(3), .. })));
        assert!(op.steps.iter().any(|s| matches!(s, OperatorStep::RemovePeer { peer: PeerId(1) })));
    }

    #[test]
    fn does_nothing_when_already_balanced() {
        let md: Arc<InMemoryMetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let store_cache = Arc::new(StoreCache::new(1, md.clone()));
        let region_cache = Arc::new(RegionCache::new(1, md));

        put_store(&store_cache, 1, 10);
        put_store(&store_cache, 2, 10);

        let region = Region::new(
            RegionId(1),
            vec![],
            vec![],
            vec![Peer { id: PeerId(1), store_id: StoreId(1) }, Peer { id: PeerId(2), store_id: StoreId(2) }],
        );
        region_cache.set_region(region).unwrap();

        let ctx = SchedulerContext {
            store_cache,
            region_cache,
            operator_controller: Arc::new(OperatorController::new(ScheduleLimits::default())),
            config: ScheduleConfig::default(),
            replication: ReplicationConfig::default(),
        };

        let scheduler = BalanceRegionScheduler::new();
        let ops = scheduler.schedule(&ctx, Utc::now());
        assert!(ops.is_empty());
    }
}
