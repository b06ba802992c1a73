//! Admission gate and slot assignment
//!
//! A counting semaphore bounds total in-flight fetches to
//! `pool_size * max_concurrent_per_worker`. The request sequence number is
//! advanced only while a permit is held, so the n-th admitted request is
//! assigned slot `(n - 1) % pool_size` and k concurrent admissions cover k
//! distinct slots (for k <= pool_size).

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::PoolError;

/// Bounded-concurrency gate with round-robin slot assignment
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    pool_size: usize,
    /// Last assigned sequence number; 0 before the first admission
    sequence: Mutex<u64>,
}

/// A held admission permit and the slot it was assigned
///
/// Dropping the admission releases the permit.
#[derive(Debug)]
pub struct Admission {
    slot: usize,
    sequence: u64,
    _permit: OwnedSemaphorePermit,
}

impl Admission {
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Release the permit back to the gate
    pub fn release(self) {
        debug!(slot = self.slot, sequence = self.sequence, "Admission released");
    }
}

impl AdmissionGate {
    /// Create a gate for `pool_size` slots of `per_worker` concurrent fetches each
    ///
    /// Both values must be at least 1; `PoolConfig` validation guarantees it.
    #[must_use]
    pub fn new(pool_size: usize, per_worker: usize) -> Self {
        let pool_size = pool_size.max(1);
        let capacity = pool_size.saturating_mul(per_worker.max(1));
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            pool_size,
            sequence: Mutex::new(0),
        }
    }

    /// Wait for a permit, then assign the next slot index
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShuttingDown` once the gate has been closed.
    pub async fn acquire_slot(&self) -> Result<Admission, PoolError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::ShuttingDown)?;

        let sequence = {
            let mut seq = self.sequence.lock();
            *seq += 1;
            *seq
        };
        let slot = ((sequence - 1) % self.pool_size as u64) as usize;

        debug!(slot, sequence, "Admission granted");
        Ok(Admission {
            slot,
            sequence,
            _permit: permit,
        })
    }

    /// Stop admitting. Waiters and future callers get `ShuttingDown`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Total admissions granted so far
    #[must_use]
    pub fn admitted(&self) -> u64 {
        *self.sequence.lock()
    }
}
