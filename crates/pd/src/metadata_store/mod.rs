//! Durable metadata store contract and a development/test implementation.

pub mod memory;
pub mod r#trait;

pub use memory::InMemoryMetadataStore;
pub use r#trait::{MetadataStore, TxnCheck, TxnOp, WatchEvent, WatchEventKind};

/// Key layout used against the durable store (§6). Not a protocol, just
/// a naming convention the core follows consistently.
pub mod keys {
    pub fn store(cluster_id: u64, store_id: u64) -> String {
        format!("/{cluster_id}/raft/s/{store_id:020}")
    }

    pub fn region(cluster_id: u64, region_id: u64) -> String {
        format!("/{cluster_id}/raft/r/{region_id:020}")
    }

    pub fn alloc_id(cluster_id: u64) -> String {
        format!("/{cluster_id}/alloc_id")
    }

    pub fn timestamp(cluster_id: u64) -> String {
        format!("/{cluster_id}/timestamp")
    }

    pub fn leader() -> String {
        "/leader".to_string()
    }

    pub fn bootstrap(cluster_id: u64) -> String {
        format!("/{cluster_id}/bootstrap")
    }

    pub fn schedule_config(cluster_id: u64) -> String {
        format!("/{cluster_id}/config/schedule")
    }

    pub fn replication_config(cluster_id: u64) -> String {
        format!("/{cluster_id}/config/replication")
    }

    pub fn scheduler_config(cluster_id: u64, name: &str) -> String {
        format!("/{cluster_id}/config/scheduler/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn store_key_is_zero_padded_to_twenty_digits() {
        assert_eq!(keys::store(1, 42), "/1/raft/s/00000000000000000042");
    }

    #[test]
    fn region_key_is_zero_padded_to_twenty_digits() {
        assert_eq!(keys::region(1, 7), "/1/raft/r/00000000000000000007");
    }
}
