//! Monotonically increasing 64-bit id allocation, backed by the durable
//! metadata store (§2 IdAllocator).

use crate::error::PdError;
use crate::metadata_store::{MetadataStore, TxnCheck, TxnOp};
use parking_lot::Mutex;
use std::sync::Arc;

/// Hands out ids in batches, persisting the new high-watermark before
/// returning any id in the batch so a crash never hands out a
/// previously-issued id.
pub struct IdAllocator {
    store: Arc<dyn MetadataStore>,
    key: String,
    batch_size: u64,
    inner: Mutex<Batch>,
}

#[derive(Default)]
struct Batch {
    next: u64,
    end: u64,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn MetadataStore>, key: impl Into<String>, batch_size: u64) -> Self {
        Self {
            store,
            key: key.into(),
            batch_size: batch_size.max(1),
            inner: Mutex::new(Batch::default()),
        }
    }

    /// Allocate one id.
    pub fn alloc(&self) -> Result<u64, PdError> {
        let mut batch = self.inner.lock();
        if batch.next >= batch.end {
            self.refill(&mut batch)?;
        }
        let id = batch.next;
        batch.next += 1;
        Ok(id)
    }

    fn refill(&self, batch: &mut Batch) -> Result<(), PdError> {
        loop {
            let current_raw = self.store.get(&self.key)?;
            let current: u64 = current_raw
                .as_deref()
                .map(decode_u64)
                .transpose()?
                .unwrap_or(0);
            let new_end = current + self.batch_size;

            let checks = vec![TxnCheck {
                key: self.key.clone(),
                expected_value: current_raw.clone(),
            }];
            let then = vec![TxnOp::Put(self.key.clone(), encode_u64(new_end))];
            let committed = self.store.txn(&checks, &then, &[])?;
            if committed {
                batch.next = current;
                batch.end = new_end;
                return Ok(());
            }
            // Another allocator (or a previous leader) raced us; retry
            // with the freshly observed watermark.
        }
    }
}

fn encode_u64(v: u64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

fn decode_u64(bytes: &[u8]) -> Result<u64, PdError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| {
        PdError::from_durable_store("malformed id watermark", "IdAllocator::refill")
    })?;
    Ok(u64::from_be_bytes(arr))
}
