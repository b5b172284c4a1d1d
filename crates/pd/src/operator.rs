//! Operator data model (§3, §4.5): an in-flight control-plane action
//! targeting exactly one region.

use crate::types::{PeerId, RegionEpoch, RegionId, StoreId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Pending effect of an in-flight operator on a store, so schedulers'
/// `shouldBalance` can account for work already scheduled (§4.5
/// `opInfluence`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorInfluence {
    pub leader_delta: i64,
    pub region_size_delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    AddPeer,
    RemovePeer,
    TransferLeader,
    BatchSplit,
    Range,
    Admin,
    Leader,
    Region,
}

impl OperatorKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperatorKind::AddPeer => "add-peer",
            OperatorKind::RemovePeer => "remove-peer",
            OperatorKind::TransferLeader => "transfer-leader",
            OperatorKind::BatchSplit => "batch-split",
            OperatorKind::Range => "range",
            OperatorKind::Admin => "admin",
            OperatorKind::Leader => "leader",
            OperatorKind::Region => "region",
        }
    }
}

/// A single control-flow step handed to a store via a heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorStep {
    AddPeer { peer: PeerId, store_id: StoreId },
    RemovePeer { peer: PeerId },
    TransferLeader { from: PeerId, to: PeerId },
    BatchSplit { new_region_ids: Vec<RegionId> },
}

#[derive(Debug, Clone)]
pub struct Operator {
    pub region_id: RegionId,
    pub kind: OperatorKind,
    pub steps: Vec<OperatorStep>,
    pub current_step: usize,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    pub influence: HashMap<StoreId, OperatorInfluence>,
    /// Region epoch at the moment this operator was proposed, so
    /// `step_invalidated` can tell a concurrent split/merge (version
    /// bump) from the operator's own membership change (§4.5).
    pub epoch: RegionEpoch,
}

impl Operator {
    pub fn new(region_id: RegionId, kind: OperatorKind, steps: Vec<OperatorStep>, created_at: DateTime<Utc>) -> Self {
        Self {
            region_id,
            kind,
            steps,
            current_step: 0,
            created_at,
            timeout: Duration::from_secs(10 * 60),
            influence: HashMap::new(),
            epoch: RegionEpoch::default(),
        }
    }

    pub fn with_influence(mut self, influence: HashMap<StoreId, OperatorInfluence>) -> Self {
        self.influence = influence;
        self
    }

    pub fn with_epoch(mut self, epoch: RegionEpoch) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.kind == OperatorKind::Admin
    }

    pub fn current(&self) -> Option<&OperatorStep> {
        self.steps.get(self.current_step)
    }

    pub fn is_finished(&self) -> bool {
        self.current_step >= self.steps.len()
    }

    pub fn advance(&mut self) {
        if !self.is_finished() {
            self.current_step += 1;
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > self.timeout
    }
}
