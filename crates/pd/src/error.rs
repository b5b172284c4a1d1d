//! Error taxonomy for the placement driver core (§7).

use crate::types::{RegionEpoch, RegionId, StoreId};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PdError {
    NotBootstrapped,
    AlreadyBootstrapped,
    NotLeader {
        leader_hint: Option<String>,
    },
    StaleEpoch {
        region_id: RegionId,
        reported: RegionEpoch,
        current: RegionEpoch,
    },
    StoreTombstoned {
        store_id: StoreId,
    },
    StoreNotFound {
        store_id: StoreId,
    },
    StoreAddressConflict {
        address: String,
        existing_store_id: StoreId,
    },
    RegionNotFound {
        region_id: RegionId,
    },
    RegionOverlap {
        region_id: RegionId,
    },
    OperatorDuplicate {
        region_id: RegionId,
    },
    OperatorLimitReached {
        kind: String,
    },
    DurableStoreUnavailable {
        context: String,
        reason: String,
    },
    Cancelled,
}

impl fmt::Display for PdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdError::NotBootstrapped => write!(f, "cluster is not bootstrapped"),
            PdError::AlreadyBootstrapped => write!(f, "cluster is already bootstrapped"),
            PdError::NotLeader { leader_hint } => match leader_hint {
                Some(hint) => write!(f, "not leader, current leader is {hint}"),
                None => write!(f, "not leader, current leader unknown"),
            },
            PdError::StaleEpoch {
                region_id,
                reported,
                current,
            } => write!(
                f,
                "stale epoch for {region_id}: reported {reported}, current {current}"
            ),
            PdError::StoreTombstoned { store_id } => {
                write!(f, "store {store_id} is tombstoned")
            }
            PdError::StoreNotFound { store_id } => write!(f, "store {store_id} not found"),
            PdError::StoreAddressConflict {
                address,
                existing_store_id,
            } => write!(
                f,
                "address {address} already used by store {existing_store_id}"
            ),
            PdError::RegionNotFound { region_id } => write!(f, "region {region_id} not found"),
            PdError::RegionOverlap { region_id } => {
                write!(f, "region {region_id} could not be reconciled with overlapping regions")
            }
            PdError::OperatorDuplicate { region_id } => {
                write!(f, "an operator is already active for region {region_id}")
            }
            PdError::OperatorLimitReached { kind } => {
                write!(f, "operator schedule limit reached for kind {kind}")
            }
            PdError::DurableStoreUnavailable { context, reason } => {
                write!(f, "durable store unavailable in {context}: {reason}")
            }
            PdError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for PdError {}

impl PdError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PdError::StoreNotFound { .. } | PdError::RegionNotFound { .. }
        )
    }

    /// Schedulers must never surface errors to stores; callers in the
    /// hot scheduling path use this to decide "skip and back off" vs.
    /// propagate.
    pub fn is_schedule_skip(&self) -> bool {
        matches!(
            self,
            PdError::OperatorDuplicate { .. } | PdError::OperatorLimitReached { .. }
        )
    }

    pub fn from_durable_store(reason: impl fmt::Display, context: &str) -> Self {
        PdError::DurableStoreUnavailable {
            context: context.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = PdError::StoreNotFound {
            store_id: StoreId(4),
        };
        assert_eq!(err.to_string(), "store store-4 not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn schedule_skip_classification() {
        let err = PdError::OperatorLimitReached {
            kind: "region".to_string(),
        };
        assert!(err.is_schedule_skip());
        assert!(!err.is_not_found());
    }
}
