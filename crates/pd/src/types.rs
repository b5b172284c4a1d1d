//! Core identifiers shared across the placement driver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a store (storage node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u64);

/// Unique identifier for a region (Raft replication group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u64);

/// Unique identifier for a peer (one replica of a region on a store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

macro_rules! id_boilerplate {
    ($ty:ident, $prefix:literal) => {
        impl From<u64> for $ty {
            fn from(v: u64) -> Self {
                $ty(v)
            }
        }

        impl From<$ty> for u64 {
            fn from(v: $ty) -> Self {
                v.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_boilerplate!(StoreId, "store-");
id_boilerplate!(RegionId, "region-");
id_boilerplate!(PeerId, "peer-");

/// `(conf_ver, version)` pair, monotonically advanced on membership or
/// range changes. Staleness checks (§4.2) compare the two fields
/// component-wise: an epoch is stale if *either* field regressed.
/// Global monotonicity (§8 property 1) is defined over the lexicographic
/// order `(version, conf_ver)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegionEpoch {
    pub conf_ver: u64,
    pub version: u64,
}

impl RegionEpoch {
    pub fn new(conf_ver: u64, version: u64) -> Self {
        Self { conf_ver, version }
    }

    /// True if `self` is stale relative to `current`: either component
    /// has strictly regressed.
    pub fn is_stale_relative_to(&self, current: &RegionEpoch) -> bool {
        self.version < current.version || self.conf_ver < current.conf_ver
    }

    pub fn bump_version(&self) -> Self {
        Self {
            conf_ver: self.conf_ver,
            version: self.version + 1,
        }
    }

    pub fn bump_conf_ver(&self) -> Self {
        Self {
            conf_ver: self.conf_ver + 1,
            version: self.version,
        }
    }
}

/// Lexicographic order on `(version, conf_ver)`, used only for the
/// global-monotonicity testable property — not for staleness rejection.
impl PartialOrd for RegionEpoch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegionEpoch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.version, self.conf_ver).cmp(&(other.version, other.conf_ver))
    }
}

impl fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch({}, {})", self.conf_ver, self.version)
    }
}

/// A single replica of a region, living on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub store_id: StoreId,
}

/// A strictly monotonic `(physical_ms, logical)` timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub physical_ms: i64,
    pub logical: i64,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_ms, self.logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_id_conversions() {
        let id: StoreId = 7u64.into();
        assert_eq!(id, StoreId(7));
        let raw: u64 = id.into();
        assert_eq!(raw, 7);
        assert_eq!(id.to_string(), "store-7");
    }

    #[test]
    fn region_epoch_staleness_is_component_wise() {
        let current = RegionEpoch::new(3, 5);
        // Lower version only
        assert!(RegionEpoch::new(3, 4).is_stale_relative_to(&current));
        // Lower conf_ver only
        assert!(RegionEpoch::new(2, 5).is_stale_relative_to(&current));
        // Equal is not stale
        assert!(!RegionEpoch::new(3, 5).is_stale_relative_to(&current));
        // Strictly greater in both is not stale
        assert!(!RegionEpoch::new(4, 6).is_stale_relative_to(&current));
    }

    #[test]
    fn region_epoch_lex_order() {
        assert!(RegionEpoch::new(0, 1) < RegionEpoch::new(0, 2));
        // version dominates conf_ver in the lex order
        assert!(RegionEpoch::new(99, 1) < RegionEpoch::new(0, 2));
    }

    #[test]
    fn timestamp_ordering() {
        let a = Timestamp { physical_ms: 100, logical: 5 };
        let b = Timestamp { physical_ms: 100, logical: 6 };
        let c = Timestamp { physical_ms: 101, logical: 0 };
        assert!(a < b);
        assert!(b < c);
    }
}
