//! Admission control: the shared rate budget and the in-flight bulkhead.
//!
//! Two independent ceilings protect the remote service and this process:
//!
//! * [`RateBudget`] — a rolling 60-second window of send timestamps. The
//!   service tolerates only a few dozen requests per minute per client
//!   before throttling or banning; every send must pass through the budget.
//! * [`Bulkhead`] — a semaphore capping simultaneous in-flight sends,
//!   bounding connection and memory use regardless of how slowly the
//!   service answers.
//!
//! Both suspend the caller cooperatively (tokio sleep / semaphore wait),
//! never spin. Cancellation while waiting reserves nothing: the budget
//! records a timestamp only at admission, and the bulkhead permit releases
//! on drop.

use crate::error::LensError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

/// The rolling window length.
const WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window request budget, shared by all concurrent callers of one
/// client instance.
///
/// Uses the tokio clock so tests can run under paused time.
#[derive(Debug)]
pub struct RateBudget {
    limit: u32,
    window: Mutex<VecDeque<Instant>>,
}

impl RateBudget {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            limit: max_per_minute.max(1),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// The configured per-window ceiling.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Wait until the window has capacity, then record this send.
    ///
    /// Suspends on the tokio timer until the oldest timestamp leaves the
    /// window; woken callers re-compete for the freed slot, so no FIFO order
    /// is promised, but every waiter is admitted once enough old stamps
    /// expire. Cancelling the future while suspended records nothing.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut window = self.window.lock().expect("rate window lock poisoned");
                let now = Instant::now();
                Self::prune(&mut window, now);
                if (window.len() as u32) < self.limit {
                    window.push_back(now);
                    return;
                }
                // Oldest stamp leaves the window first; sleep until then.
                window[0] + WINDOW
            };
            debug!(limit = self.limit, "Rate budget exhausted, suspending caller");
            sleep_until(wake_at).await;
        }
    }

    /// Record this send if the window has capacity, without waiting.
    ///
    /// # Errors
    /// [`LensError::RateLimitExceeded`] when the window is full.
    pub fn try_acquire(&self) -> Result<(), LensError> {
        let mut window = self.window.lock().expect("rate window lock poisoned");
        let now = Instant::now();
        Self::prune(&mut window, now);
        if (window.len() as u32) < self.limit {
            window.push_back(now);
            Ok(())
        } else {
            Err(LensError::RateLimitExceeded { limit: self.limit })
        }
    }

    /// Number of sends currently inside the window. For instrumentation.
    pub fn current_load(&self) -> usize {
        let mut window = self.window.lock().expect("rate window lock poisoned");
        Self::prune(&mut window, Instant::now());
        window.len()
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Concurrency ceiling on simultaneous in-flight sends.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
}

impl Bulkhead {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Acquire an in-flight slot, suspending when the ceiling is reached.
    ///
    /// The returned permit releases the slot on drop, including when the
    /// holding future is cancelled mid-send.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("bulkhead semaphore is never closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn second_call_waits_a_full_window_at_cap_one() {
        let budget = RateBudget::new(1);
        let start = Instant::now();

        budget.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        budget.acquire().await;
        assert!(
            start.elapsed() >= WINDOW,
            "second acquire admitted after {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_capacity_as_stamps_expire() {
        let budget = RateBudget::new(2);
        let start = Instant::now();

        budget.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        budget.acquire().await;

        // Third send: the first stamp expires at t=60.
        budget.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= WINDOW && elapsed < WINDOW + Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_fails_fast_when_full() {
        let budget = RateBudget::new(2);
        budget.try_acquire().unwrap();
        budget.try_acquire().unwrap();
        let err = budget.try_acquire().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert!(err.to_string().contains('2'));

        tokio::time::advance(WINDOW).await;
        budget.try_acquire().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_cap_admissions_per_sliding_window() {
        let budget = Arc::new(RateBudget::new(3));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let budget = Arc::clone(&budget);
            handles.push(tokio::spawn(async move {
                budget.acquire().await;
                Instant::now()
            }));
        }
        let mut stamps: Vec<Instant> = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();
        // Every admission and the two following it must span < a window for
        // the cap to be violated; check the contrapositive.
        for pair in stamps.windows(4) {
            assert!(
                pair[3].duration_since(pair[0]) >= WINDOW,
                "4 admissions inside one window at cap 3"
            );
        }
    }

    #[tokio::test]
    async fn bulkhead_never_exceeds_ceiling() {
        let bulkhead = Bulkhead::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let bulkhead = bulkhead.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = bulkhead.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3, "peak: {}", peak.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_reserves_nothing() {
        let budget = Arc::new(RateBudget::new(1));
        budget.acquire().await;
        assert_eq!(budget.current_load(), 1);

        let waiter = {
            let budget = Arc::clone(&budget);
            tokio::spawn(async move { budget.acquire().await })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        let _ = waiter.await;

        // Only the admitted send occupies the window.
        assert_eq!(budget.current_load(), 1);
    }
}
