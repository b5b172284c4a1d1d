//! TimestampOracle (§4.7): a leader-served, crash-safe source of
//! strictly increasing `(physical_ms, logical)` timestamps.

use crate::error::PdError;
use crate::metadata_store::MetadataStore;
use crate::types::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 18-bit logical counter per physical millisecond, per §4.7.
const LOGICAL_BITS: i64 = 18;
const MAX_LOGICAL: i64 = 1 << LOGICAL_BITS;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as i64
    }
}

/// Test clock: holds a settable millisecond value.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.0.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct State {
    current: Timestamp,
    saved_ts: i64,
}

pub struct TimestampOracle {
    metadata_store: Arc<dyn MetadataStore>,
    key: String,
    clock: Arc<dyn Clock>,
    save_interval_ms: i64,
    update_step: Duration,
    state: Mutex<Option<State>>,
}

impl TimestampOracle {
    pub fn new(metadata_store: Arc<dyn MetadataStore>, key: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            metadata_store,
            key: key.into(),
            clock,
            save_interval_ms: 3_000,
            update_step: Duration::from_millis(50),
            state: Mutex::new(None),
        }
    }

    /// Called once when this replica becomes PD leader.
    pub fn load_and_init(&self) -> Result<(), PdError> {
        let saved_ts = self.read_watermark()?;
        let wall_now = self.clock.now_ms();
        let now_physical = wall_now.max(saved_ts + 1);
        let new_watermark = now_physical + self.save_interval_ms;
        self.write_watermark(new_watermark)?;

        *self.state.lock() = Some(State {
            current: Timestamp { physical_ms: now_physical, logical: 0 },
            saved_ts: new_watermark,
        });
        Ok(())
    }

    fn read_watermark(&self) -> Result<i64, PdError> {
        let raw = self.metadata_store.get(&self.key)?;
        Ok(raw
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .map(i64::from_be_bytes)
            .unwrap_or(0))
    }

    fn write_watermark(&self, value: i64) -> Result<(), PdError> {
        self.metadata_store.put(&self.key, value.to_be_bytes().to_vec())
    }

    /// Allocates `n` strictly increasing logical timestamps, advancing
    /// `physical_ms` to the wall clock (or bumping it on logical
    /// overflow), and persists the watermark ahead of use when needed.
    pub fn alloc(&self, n: u32) -> Result<(Timestamp, Timestamp), PdError> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(PdError::NotLeader { leader_hint: None })?;

        let wall_now = self.clock.now_ms();
        if state.current.physical_ms < wall_now {
            state.current.physical_ms = wall_now;
            state.current.logical = 0;
        }

        let first = state.current.logical;
        let last_exclusive = first + n as i64;
        let (physical_ms, first, last_exclusive) = if last_exclusive > MAX_LOGICAL {
            state.current.physical_ms += 1;
            (state.current.physical_ms, 0, n as i64)
        } else {
            (state.current.physical_ms, first, last_exclusive)
        };
        state.current.logical = last_exclusive;

        let first_ts = Timestamp { physical_ms, logical: first };
        let last_ts = Timestamp { physical_ms, logical: last_exclusive - 1 };
        self.maybe_persist_watermark(state)?;
        Ok((first_ts, last_ts))
    }

    fn maybe_persist_watermark(&self, state: &mut State) -> Result<(), PdError> {
        let headroom = self.save_interval_ms - self.update_step.as_millis() as i64;
        if state.current.physical_ms - state.saved_ts > headroom {
            let new_watermark = state.current.physical_ms + self.save_interval_ms;
            self.write_watermark(new_watermark)?;
            state.saved_ts = new_watermark;
        }
        Ok(())
    }

    /// Periodic ticker (`update_step` cadence): refreshes `physical_ms`
    /// to the wall clock, refusing to regress on backward clock jumps.
    pub fn tick(&self) {
        let mut guard = self.state.lock();
        let Some(state) = guard.as_mut() else { return };
        let wall_now = self.clock.now_ms();
        if wall_now > state.current.physical_ms {
            state.current.physical_ms = wall_now;
            state.current.logical = 0;
        } else if wall_now < state.current.physical_ms {
            log::warn!("wall clock moved backwards by {}ms, holding at saved_ts", state.current.physical_ms - wall_now);
        }
    }

    pub fn current(&self) -> Option<Timestamp> {
        self.state.lock().as_ref().map(|s| s.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::InMemoryMetadataStore;

    fn oracle(wall_now: i64) -> (TimestampOracle, Arc<FixedClock>) {
        let store = Arc::new(InMemoryMetadataStore::new());
        let clock = Arc::new(FixedClock::new(wall_now));
        let oracle = TimestampOracle::new(store, "/1/timestamp", clock.clone());
        oracle.load_and_init().unwrap();
        (oracle, clock)
    }

    #[test]
    fn s7_batch_allocation_returns_contiguous_logical_range() {
        let (oracle, _clock) = oracle(100);
        let (first, last) = oracle.alloc(10).unwrap();
        assert_eq!(first, Timestamp { physical_ms: 100, logical: 0 });
        assert_eq!(last, Timestamp { physical_ms: 100, logical: 9 });

        let (first2, last2) = oracle.alloc(5).unwrap();
        assert_eq!(first2, Timestamp { physical_ms: 100, logical: 10 });
        assert_eq!(last2, Timestamp { physical_ms: 100, logical: 14 });
    }

    #[test]
    fn allocations_are_strictly_monotonic() {
        let (oracle, clock) = oracle(100);
        let (_, last1) = oracle.alloc(3).unwrap();
        clock.advance(1);
        let (first2, _) = oracle.alloc(3).unwrap();
        assert!(first2 > last1);
    }

    #[test]
    fn successor_leader_never_regresses_past_saved_watermark() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let clock1 = Arc::new(FixedClock::new(1_000));
        let oracle1 = TimestampOracle::new(store.clone(), "/1/timestamp", clock1);
        oracle1.load_and_init().unwrap();
        let (_, last) = oracle1.alloc(1).unwrap();

        // New leader starts with a much earlier wall clock (drift) but
        // must still observe the persisted watermark.
        let clock2 = Arc::new(FixedClock::new(500));
        let oracle2 = TimestampOracle::new(store, "/1/timestamp", clock2);
        oracle2.load_and_init().unwrap();
        let (first, _) = oracle2.alloc(1).unwrap();
        assert!(first > last);
    }

    #[test]
    fn tick_refuses_to_regress_on_backward_clock_jump() {
        let (oracle, clock) = oracle(1_000);
        oracle.alloc(1).unwrap();
        clock.set(500);
        oracle.tick();
        assert_eq!(oracle.current().unwrap().physical_ms, 1_000);
    }
}
