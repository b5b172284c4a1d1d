//! Contract required of the durable metadata store (§6).
//!
//! The durable store itself (an etcd-equivalent) is an external
//! collaborator and out of scope for this crate; this trait names only
//! the operations the core actually calls.

use crate::error::PdError;
use std::time::Duration;

/// A single-key equality precondition for [`MetadataStore::txn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnCheck {
    pub key: String,
    pub expected_value: Option<Vec<u8>>,
}

/// A single write performed as part of a transaction's `then`/`else` branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// What happened to a key at a given revision, as surfaced by
/// [`MetadataStore::watch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Put(Vec<u8>),
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub rev: u64,
    pub key: String,
    pub kind: WatchEventKind,
}

pub trait MetadataStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PdError>;

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PdError>;

    fn delete(&self, key: &str) -> Result<(), PdError>;

    /// Evaluate `checks`; if every check is satisfied (key present and
    /// equal to `expected_value`, or both the key absent and
    /// `expected_value` is `None`), apply `then` and return `true`;
    /// otherwise apply `or_else` and return `false`. Applied atomically.
    fn txn(&self, checks: &[TxnCheck], then: &[TxnOp], or_else: &[TxnOp]) -> Result<bool, PdError>;

    /// Attempt to become the holder of `key` with the given lease TTL.
    /// Returns `true` if the campaign succeeded (no live holder, or
    /// `holder` was already the live holder).
    fn campaign(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, PdError>;

    /// Renew the lease on `key` if `holder` currently holds it. Returns
    /// `false` if the lease expired or another holder won in the
    /// meantime.
    fn renew_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, PdError>;

    /// The live holder of `key`, or `None` if unheld or expired. A
    /// leader-loss watch is modeled as repeated polling of this method
    /// since the core only needs "does the lease still exist", not an
    /// event stream.
    fn current_leader(&self, key: &str) -> Result<Option<String>, PdError>;

    /// Every `put`/`delete` of `key` with a revision strictly greater
    /// than `from_rev`, oldest first (§6). `from_rev = 0` returns the
    /// key's full history. A real client would keep this as a
    /// long-lived gRPC stream from the store; callers here are
    /// expected to re-poll with the last-seen revision.
    fn watch(&self, key: &str, from_rev: u64) -> Result<Vec<WatchEvent>, PdError>;
}
