//! Concurrency governor for higher-level units of work.
//!
//! Bounds how many channels (or spaces) migrate in parallel, independent of
//! per-call token buckets: a worker may hold a concurrency slot while it
//! waits on a rate-limit token. Bulk-read pipelines default to more slots
//! than bulk-write pipelines (see [`crate::config::CommandProfile`]).

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::MigrateError;

/// A counting semaphore over higher-level work units.
#[derive(Debug, Clone)]
pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    slots: usize,
}

impl ConcurrencyGovernor {
    /// Create a governor with `slots` concurrent units allowed.
    ///
    /// A slot count of zero would deadlock every caller, so it is bumped
    /// to one.
    pub fn new(slots: usize) -> Self {
        let slots = slots.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
            slots,
        }
    }

    /// The configured slot count.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Slots not currently held.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run one unit of work holding a slot.
    ///
    /// Suspends until a slot frees up when all are in flight. The slot is
    /// released when the wrapped future settles, success or failure.
    pub async fn with_slot<F, Fut, T>(&self, work: F) -> Result<T, MigrateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MigrateError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| MigrateError::Concurrency(e.to_string()))?;
        work().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_in_flight_never_exceeds_slots() {
        let governor = ConcurrencyGovernor::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let governor = governor.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                governor
                    .with_slot(|| async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, MigrateError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_slot_released_on_failure() {
        let governor = ConcurrencyGovernor::new(1);

        let result: Result<(), _> = governor
            .with_slot(|| async { Err(MigrateError::Timeout) })
            .await;
        assert!(result.is_err());

        // The failed unit's slot is back.
        assert_eq!(governor.available_slots(), 1);
        governor
            .with_slot(|| async { Ok::<_, MigrateError>(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_slots_is_clamped() {
        let governor = ConcurrencyGovernor::new(0);
        assert_eq!(governor.slots(), 1);
        governor
            .with_slot(|| async { Ok::<_, MigrateError>(()) })
            .await
            .unwrap();
    }
}
