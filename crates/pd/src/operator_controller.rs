//! OperatorController (§4.5): admission, dedup, timeout, and history for
//! in-flight operators.

use crate::error::PdError;
use crate::operator::{Operator, OperatorInfluence, OperatorKind, OperatorStep};
use crate::region::Region;
use crate::types::{PeerId, RegionEpoch, RegionId, StoreId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleLimits {
    pub leader_schedule_limit: u64,
    pub region_schedule_limit: u64,
    pub replica_schedule_limit: u64,
    pub hot_region_schedule_limit: u64,
}

impl ScheduleLimits {
    fn limit_for(&self, kind: OperatorKind) -> Option<u64> {
        match kind {
            OperatorKind::TransferLeader | OperatorKind::Leader => Some(self.leader_schedule_limit),
            OperatorKind::AddPeer | OperatorKind::RemovePeer | OperatorKind::Region => {
                Some(self.region_schedule_limit)
            }
            OperatorKind::BatchSplit | OperatorKind::Range => Some(self.replica_schedule_limit),
            OperatorKind::Admin => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Finished,
    TimedOut,
    Invalidated,
    InProgress,
}

const HISTORY_CAPACITY: usize = 1000;

struct State {
    active: HashMap<RegionId, Operator>,
    counters: HashMap<OperatorKind, u64>,
    history: VecDeque<Operator>,
}

pub struct OperatorController {
    limits: ScheduleLimits,
    state: RwLock<State>,
}

impl OperatorController {
    pub fn new(limits: ScheduleLimits) -> Self {
        Self {
            limits,
            state: RwLock::new(State {
                active: HashMap::new(),
                counters: HashMap::new(),
                history: VecDeque::new(),
            }),
        }
    }

    /// Admits `op`, enforcing per-region uniqueness (non-admin) and
    /// per-kind concurrency limits.
    pub fn add(&self, op: Operator) -> Result<(), PdError> {
        let mut state = self.state.write();

        if !op.is_admin() {
            if let Some(existing) = state.active.get(&op.region_id) {
                if !existing.is_admin() {
                    return Err(PdError::OperatorDuplicate { region_id: op.region_id });
                }
            }
        }

        if let Some(limit) = self.limits.limit_for(op.kind) {
            let current = *state.counters.get(&op.kind).unwrap_or(&0);
            if limit > 0 && current >= limit {
                return Err(PdError::OperatorLimitReached { kind: op.kind.label().to_string() });
            }
        }

        *state.counters.entry(op.kind).or_insert(0) += 1;
        state.active.insert(op.region_id, op);
        Ok(())
    }

    /// Idempotent: removing an absent region's operator is a no-op.
    pub fn remove(&self, region_id: RegionId) {
        let mut state = self.state.write();
        if let Some(op) = state.active.remove(&region_id) {
            if let Some(counter) = state.counters.get_mut(&op.kind) {
                *counter = counter.saturating_sub(1);
            }
            if state.history.len() >= HISTORY_CAPACITY {
                state.history.pop_front();
            }
            state.history.push_back(op);
        }
    }

    pub fn get(&self, region_id: RegionId) -> Option<Operator> {
        self.state.read().active.get(&region_id).cloned()
    }

    pub fn count(&self, kind: OperatorKind) -> u64 {
        *self.state.read().counters.get(&kind).unwrap_or(&0)
    }

    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Region ids with a currently active operator, for the background
    /// timeout sweep.
    pub fn active_region_ids(&self) -> Vec<RegionId> {
        self.state.read().active.keys().copied().collect()
    }

    /// §4.5 `check`: evaluates the live operator for `region` against
    /// observed state, advancing or retiring it as needed. Returns the
    /// next control-flow step to hand to the heartbeating store, if any.
    pub fn check(&self, region: &Region, now: DateTime<Utc>) -> (CheckStatus, Option<OperatorStep>) {
        let mut state = self.state.write();
        let Some(op) = state.active.get_mut(&region.id) else {
            return (CheckStatus::Finished, None);
        };

        if op.is_timed_out(now) {
            drop_and_retire(&mut state, region.id, HISTORY_CAPACITY);
            return (CheckStatus::TimedOut, None);
        }

        let Some(step) = op.current().cloned() else {
            drop_and_retire(&mut state, region.id, HISTORY_CAPACITY);
            return (CheckStatus::Finished, None);
        };

        if step_invalidated(&step, region, op.epoch) {
            drop_and_retire(&mut state, region.id, HISTORY_CAPACITY);
            return (CheckStatus::Invalidated, None);
        }

        if step_observed_applied(&step, region) {
            op.advance();
            if op.is_finished() {
                drop_and_retire(&mut state, region.id, HISTORY_CAPACITY);
                return (CheckStatus::Finished, None);
            }
        }

        let next = state.active.get(&region.id).and_then(|op| op.current().cloned());
        (CheckStatus::InProgress, next)
    }

    /// Aggregate pending `{leader_delta, region_size_delta}` across all
    /// active operators touching `store`, used by `shouldBalance`.
    pub fn op_influence(&self, store: StoreId) -> OperatorInfluence {
        let state = self.state.read();
        let mut total = OperatorInfluence::default();
        for op in state.active.values() {
            if let Some(inf) = op.influence.get(&store) {
                total.leader_delta += inf.leader_delta;
                total.region_size_delta += inf.region_size_delta;
            }
        }
        total
    }
}

fn drop_and_retire(state: &mut State, region_id: RegionId, capacity: usize) {
    if let Some(op) = state.active.remove(&region_id) {
        if let Some(counter) = state.counters.get_mut(&op.kind) {
            *counter = counter.saturating_sub(1);
        }
        if state.history.len() >= capacity {
            state.history.pop_front();
        }
        state.history.push_back(op);
    }
}

fn step_observed_applied(step: &OperatorStep, region: &Region) -> bool {
    match step {
        OperatorStep::AddPeer { peer, .. } => {
            region.peers.iter().any(|p| p.id == *peer) && !region.pending_peers.contains(peer)
        }
        OperatorStep::RemovePeer { peer } => !region.peers.iter().any(|p| p.id == *peer),
        OperatorStep::TransferLeader { to, .. } => region.leader == Some(*to),
        OperatorStep::BatchSplit { .. } => true,
    }
}

/// A region's `version` only advances on a split or merge, never as the
/// direct effect of any operator step (those only touch `conf_ver` or
/// leader); so a version mismatch always means the operator's target
/// region shape is stale, regardless of step kind.
fn step_invalidated(step: &OperatorStep, region: &Region, op_epoch: RegionEpoch) -> bool {
    if region.epoch.version != op_epoch.version {
        return true;
    }
    match step {
        OperatorStep::TransferLeader { from, .. } => {
            !region.peers.iter().any(|p| p.id == *from)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peer;

    fn region_with_peer(id: u64, peer: u64, store: u64) -> Region {
        Region::new(RegionId(id), vec![], vec![], vec![Peer { id: PeerId(peer), store_id: StoreId(store) }])
    }

    #[test]
    fn rejects_second_non_admin_operator_for_same_region() {
        let ctrl = OperatorController::new(ScheduleLimits::default());
        let op1 = Operator::new(RegionId(1), OperatorKind::RemovePeer, vec![], Utc::now());
        let op2 = Operator::new(RegionId(1), OperatorKind::AddPeer, vec![], Utc::now());
        ctrl.add(op1).unwrap();
        let err = ctrl.add(op2).unwrap_err();
        assert!(matches!(err, PdError::OperatorDuplicate { .. }));
    }

    #[test]
    fn enforces_per_kind_limit() {
        let limits = ScheduleLimits { region_schedule_limit: 1, ..Default::default() };
        let ctrl = OperatorController::new(limits);
        ctrl.add(Operator::new(RegionId(1), OperatorKind::AddPeer, vec![], Utc::now())).unwrap();
        let err = ctrl
            .add(Operator::new(RegionId(2), OperatorKind::AddPeer, vec![], Utc::now()))
            .unwrap_err();
        assert!(matches!(err, PdError::OperatorLimitReached { .. }));
    }

    #[test]
    fn check_finishes_when_step_is_observed() {
        let ctrl = OperatorController::new(ScheduleLimits::default());
        let op = Operator::new(
            RegionId(1),
            OperatorKind::TransferLeader,
            vec![OperatorStep::TransferLeader { from: PeerId(1), to: PeerId(2) }],
            Utc::now(),
        );
        ctrl.add(op).unwrap();

        let mut region = region_with_peer(1, 1, 1);
        region.peers.push(Peer { id: PeerId(2), store_id: StoreId(2) });
        region.leader = Some(PeerId(2));

        let (status, step) = ctrl.check(&region, Utc::now());
        assert_eq!(status, CheckStatus::Finished);
        assert!(step.is_none());
        assert_eq!(ctrl.count(OperatorKind::TransferLeader), 0);
    }

    #[test]
    fn check_times_out_after_deadline() {
        let ctrl = OperatorController::new(ScheduleLimits::default());
        let mut op = Operator::new(
            RegionId(1),
            OperatorKind::AddPeer,
            vec![OperatorStep::AddPeer { peer: PeerId(9), store_id: StoreId(9) }],
            Utc::now(),
        );
        op.timeout = std::time::Duration::from_secs(0);
        ctrl.add(op).unwrap();

        let region = region_with_peer(1, 1, 1);
        let (status, _) = ctrl.check(&region, Utc::now() + chrono::Duration::milliseconds(1));
        assert_eq!(status, CheckStatus::TimedOut);
        assert!(ctrl.get(RegionId(1)).is_none());
    }

    #[test]
    fn op_influence_aggregates_across_active_operators() {
        let ctrl = OperatorController::new(ScheduleLimits::default());
        let mut influence = HashMap::new();
        influence.insert(StoreId(1), OperatorInfluence { leader_delta: -1, region_size_delta: 0 });
        influence.insert(StoreId(2), OperatorInfluence { leader_delta: 1, region_size_delta: 0 });
        let op = Operator::new(RegionId(1), OperatorKind::TransferLeader, vec![], Utc::now())
            .with_influence(influence);
        ctrl.add(op).unwrap();

        assert_eq!(ctrl.op_influence(StoreId(1)).leader_delta, -1);
        assert_eq!(ctrl.op_influence(StoreId(2)).leader_delta, 1);
        assert_eq!(ctrl.op_influence(StoreId(3)).leader_delta, 0);
    }

    #[test]
    fn check_invalidates_add_peer_step_after_concurrent_split() {
        let ctrl = OperatorController::new(ScheduleLimits::default());
        let op = Operator::new(
            RegionId(1),
            OperatorKind::AddPeer,
            vec![OperatorStep::AddPeer { peer: PeerId(9), store_id: StoreId(9) }],
            Utc::now(),
        )
        .with_epoch(RegionEpoch::new(1, 1));
        ctrl.add(op).unwrap();

        // A concurrent split bumps `version` without touching the peer
        // list the step was targeting.
        let mut region = region_with_peer(1, 1, 1);
        region.epoch = RegionEpoch::new(1, 2);

        let (status, step) = ctrl.check(&region, Utc::now());
        assert_eq!(status, CheckStatus::Invalidated);
        assert!(step.is_none());
        assert!(ctrl.get(RegionId(1)).is_none());
    }
}
