// Poll Scheduler - periodic, failure-isolated META polling loop
//
// One control loop drives a bounded pool of concurrent ingestion-worker
// invocations. Per-target state transitions forever:
// PENDING -> IN_FLIGHT -> {SUCCEEDED, FAILED} -> PENDING
//
// Invariants:
// - at most one in-flight invocation per target
// - poll start times of one target are spaced >= interval
// - at most max_concurrency invocations in flight overall
// - a failed target never delays any sibling's schedule

pub mod constants;
mod shutdown;

use constants::SCHEDULER_TICK;
pub use shutdown::{stop_channel, StopHandle, StopSignal};

use crate::domain::{ErrorRecord, Target};
use crate::port::{FetchFailure, MetaFetcher, TimeProvider};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between two poll attempts of the same target
    pub interval: Duration,
    /// Bound on simultaneously in-flight worker invocations
    pub max_concurrency: usize,
}

/// Result of one finished poll invocation, mapped back to its target
struct PollOutcome {
    index: usize,
    result: std::result::Result<(), FetchFailure>,
}

/// Poll scheduler driving all registered targets.
///
/// Owns the target list for the duration of `run` (single-writer: worker
/// tasks only report outcomes, they never touch target state).
pub struct PollScheduler {
    fetcher: Arc<dyn MetaFetcher>,
    time_provider: Arc<dyn TimeProvider>,
    config: SchedulerConfig,
}

impl PollScheduler {
    pub fn new(
        fetcher: Arc<dyn MetaFetcher>,
        time_provider: Arc<dyn TimeProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            fetcher,
            time_provider,
            config,
        }
    }

    /// Run the polling loop until stopped.
    ///
    /// On stop no new invocations start, and `run` returns only after
    /// every in-flight invocation has finished (a truncated local mirror
    /// is worse than a slightly delayed shutdown). Infallible once
    /// started: poll failures land on their target, never here. Returns
    /// the final target states for observability.
    pub async fn run(&self, mut targets: Vec<Target>, mut stop: StopSignal) -> Vec<Target> {
        info!(
            targets = targets.len(),
            interval_secs = self.config.interval.as_secs(),
            max_concurrency = self.config.max_concurrency,
            "Poll scheduler started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set: JoinSet<PollOutcome> = JoinSet::new();
        let mut in_flight: HashSet<usize> = HashSet::new();

        loop {
            if stop.is_stopped() {
                break;
            }

            self.dispatch_eligible(&mut targets, &mut in_flight, &mut join_set, &semaphore);

            tokio::select! {
                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    self.record_joined(&mut targets, &mut in_flight, joined);
                }
                _ = sleep(SCHEDULER_TICK) => {}
                _ = stop.stopped() => break,
            }
        }

        info!(in_flight = join_set.len(), "Scheduler draining in-flight polls");
        while let Some(joined) = join_set.join_next().await {
            self.record_joined(&mut targets, &mut in_flight, joined);
        }

        info!("Poll scheduler stopped");
        targets
    }

    /// Dispatch every eligible target that fits in a free concurrency slot.
    ///
    /// Targets that miss a slot stay eligible and are dispatched on a later
    /// tick once a worker finishes - delayed, never dropped.
    fn dispatch_eligible(
        &self,
        targets: &mut [Target],
        in_flight: &mut HashSet<usize>,
        join_set: &mut JoinSet<PollOutcome>,
        semaphore: &Arc<Semaphore>,
    ) {
        let interval_ms = self.config.interval.as_millis() as i64;

        for index in 0..targets.len() {
            if in_flight.contains(&index) {
                continue;
            }
            let now = self.time_provider.now_millis();
            if !targets[index].is_eligible(now, interval_ms) {
                continue;
            }

            let permit = match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break, // all slots busy, try again next tick
            };

            let target = &mut targets[index];
            target.last_attempt_ms = Some(now);
            in_flight.insert(index);
            debug!(target = %target.id, "Dispatching poll");

            let fetcher = Arc::clone(&self.fetcher);
            let target_id = target.id.clone();
            let fetch_spec = target.fetch_spec.clone();
            join_set.spawn(async move {
                let _permit = permit;
                // A panicking worker must not kill the daemon: catch the
                // unwind and report it as a failed poll.
                let result = AssertUnwindSafe(fetcher.fetch(&target_id, &fetch_spec))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(FetchFailure::new("worker", panic_message(panic)))
                    });
                PollOutcome { index, result }
            });
        }
    }

    fn record_joined(
        &self,
        targets: &mut [Target],
        in_flight: &mut HashSet<usize>,
        joined: std::result::Result<PollOutcome, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(outcome) => self.record_outcome(targets, in_flight, outcome),
            // Workers are never aborted and panics are caught inside the
            // task, so this only fires if the runtime is shutting down.
            Err(e) => error!(error = %e, "Poll task join failed"),
        }
    }

    /// Single result-collection point: the only place target state mutates.
    fn record_outcome(
        &self,
        targets: &mut [Target],
        in_flight: &mut HashSet<usize>,
        outcome: PollOutcome,
    ) {
        in_flight.remove(&outcome.index);
        let target = &mut targets[outcome.index];
        let now = self.time_provider.now_millis();

        match outcome.result {
            Ok(()) => {
                target.last_success_ms = Some(now);
                target.consecutive_failures = 0;
                target.last_error = None;
                info!(target = %target.id, "Poll succeeded");
            }
            Err(failure) => {
                target.consecutive_failures += 1;
                warn!(
                    target = %target.id,
                    stage = %failure.stage,
                    error = %failure.message,
                    consecutive_failures = target.consecutive_failures,
                    "Poll failed"
                );
                target.last_error = Some(ErrorRecord {
                    target_id: target.id.clone(),
                    stage: failure.stage,
                    message: failure.message,
                    timestamp_ms: now,
                });
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FetchSpec;
    use crate::port::meta_fetcher::mocks::{MockBehavior, MockMetaFetcher};
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::time_provider::SystemTimeProvider;

    fn scheduler(fetcher: Arc<MockMetaFetcher>, config: SchedulerConfig) -> PollScheduler {
        PollScheduler::new(fetcher, Arc::new(SystemTimeProvider), config)
    }

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::new(format!("target-{i}"), FetchSpec::new(serde_json::json!({}))))
            .collect()
    }

    #[tokio::test]
    async fn success_resets_failure_tracking() {
        let fetcher = Arc::new(MockMetaFetcher::new_success());
        let s = PollScheduler::new(
            fetcher,
            Arc::new(MockTimeProvider::at(5_000)),
            SchedulerConfig {
                interval: Duration::from_secs(1),
                max_concurrency: 1,
            },
        );

        let mut ts = targets(1);
        ts[0].consecutive_failures = 3;
        ts[0].last_error = Some(ErrorRecord {
            target_id: "target-0".to_string(),
            stage: "clone".to_string(),
            message: "boom".to_string(),
            timestamp_ms: 0,
        });
        let mut in_flight = HashSet::from([0]);

        s.record_outcome(
            &mut ts,
            &mut in_flight,
            PollOutcome {
                index: 0,
                result: Ok(()),
            },
        );

        assert_eq!(ts[0].consecutive_failures, 0);
        assert_eq!(ts[0].last_success_ms, Some(5_000));
        assert!(ts[0].last_error.is_none());
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn failure_increments_count_and_keeps_last_error() {
        let fetcher = Arc::new(MockMetaFetcher::new_success());
        let s = PollScheduler::new(
            fetcher,
            Arc::new(MockTimeProvider::at(7_000)),
            SchedulerConfig {
                interval: Duration::from_secs(1),
                max_concurrency: 1,
            },
        );

        let mut ts = targets(1);
        let mut in_flight = HashSet::from([0]);

        s.record_outcome(
            &mut ts,
            &mut in_flight,
            PollOutcome {
                index: 0,
                result: Err(FetchFailure::new("ls-remote", "exit status 128")),
            },
        );

        assert_eq!(ts[0].consecutive_failures, 1);
        assert!(ts[0].last_success_ms.is_none());
        let err = ts[0].last_error.as_ref().unwrap();
        assert_eq!(err.stage, "ls-remote");
        assert_eq!(err.timestamp_ms, 7_000);
    }

    #[tokio::test]
    async fn worker_panic_is_recorded_as_failed_poll() {
        let fetcher = Arc::new(MockMetaFetcher::new(MockBehavior::Panic(
            "worker exploded".to_string(),
        )));
        let s = scheduler(
            fetcher,
            SchedulerConfig {
                interval: Duration::from_secs(3600),
                max_concurrency: 1,
            },
        );

        let (stop_tx, stop_rx) = stop_channel();
        let handle = {
            let ts = targets(1);
            tokio::spawn(async move { s.run(ts, stop_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        stop_tx.stop();
        let final_targets = handle.await.unwrap();

        assert_eq!(final_targets[0].consecutive_failures, 1);
        let err = final_targets[0].last_error.as_ref().unwrap();
        assert_eq!(err.stage, "worker");
        assert!(err.message.contains("worker exploded"));
    }

    #[tokio::test]
    async fn eligibility_follows_the_injected_clock() {
        // With a frozen clock the target is polled exactly once no matter
        // how much real time passes; stepping the clock past the interval
        // makes it eligible again.
        let fetcher = Arc::new(MockMetaFetcher::new_success());
        let clock = Arc::new(MockTimeProvider::at(1_000));
        let s = PollScheduler::new(
            Arc::clone(&fetcher) as Arc<dyn MetaFetcher>,
            Arc::clone(&clock) as Arc<dyn TimeProvider>,
            SchedulerConfig {
                interval: Duration::from_secs(60),
                max_concurrency: 1,
            },
        );

        let (stop_tx, stop_rx) = stop_channel();
        let handle = {
            let ts = targets(1);
            tokio::spawn(async move { s.run(ts, stop_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fetcher.call_count(), 1, "frozen clock, one poll only");

        clock.advance(60_000);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fetcher.call_count(), 2, "advancing past the interval re-polls");

        stop_tx.stop();
        let final_targets = handle.await.unwrap();
        assert_eq!(final_targets[0].last_attempt_ms, Some(61_000));
    }
}
