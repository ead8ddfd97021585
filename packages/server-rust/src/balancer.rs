//! The balancer round loop.
//!
//! One router process at a time may move chunks around; rounds are
//! serialized by the `"balancer"` distributed lock. The chunk-move policy
//! itself lives with the configuration tier; this loop owns the cadence,
//! the lock discipline, and the stale-holder check.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::distlock::{DistLockTry, DistributedLock, LockOwnerId, LockStore};

/// How old a foreign lock must be before it is called out as stale (ms).
const STALE_LOCK_AGE_MS: u64 = 30 * 60 * 1000;

/// Periodically contends for the balancer lock and runs a round while
/// holding it.
pub struct Balancer {
    lock: DistributedLock,
    interval: Duration,
    rounds_won: std::sync::atomic::AtomicU64,
}

impl Balancer {
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>, owner: LockOwnerId, interval: Duration) -> Self {
        Self {
            lock: DistributedLock::new(store, "balancer", owner),
            interval,
            rounds_won: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Rounds this process actually ran (won the lock for).
    #[must_use]
    pub fn rounds_won(&self) -> u64 {
        self.rounds_won
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Attempts one balance round. Returns `true` when this process held
    /// the lock for it.
    pub fn balance_round(&self) -> bool {
        let guard = match DistLockTry::new(&self.lock, "doing balance round") {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "balancer couldn't reach the lock store");
                return false;
            }
        };
        if !guard.got() {
            if let Some(holder) = guard.other() {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                let age = now.saturating_sub(holder.when);
                if age > STALE_LOCK_AGE_MS {
                    warn!(holder = %holder.who, age_ms = age,
                          "balancer lock looks stale; refusing to operate around it");
                } else {
                    debug!(holder = %holder.who, why = %holder.why, "skipping balance round");
                }
            }
            return false;
        }

        // Chunk selection and migration happen against the configuration
        // tier, outside this fragment.
        self.rounds_won
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        info!(round = self.rounds_won(), "balance round complete");
        true
    }

    /// Runs rounds forever on the configured interval.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.balance_round();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
