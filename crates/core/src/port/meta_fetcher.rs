// Ingestion Worker Port
// Abstraction for the per-target META fetch/update operation

use crate::domain::FetchSpec;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the ingestion worker for one poll attempt.
///
/// `stage` names the worker-internal step that failed (e.g. "ls-remote",
/// "clone") so deployment issues are distinguishable from log output alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage}: {message}")]
pub struct FetchFailure {
    pub stage: String,
    pub message: String,
}

impl FetchFailure {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Ingestion worker trait
///
/// Fetches/updates the local META mirror for one target. Idempotent and
/// safe to invoke repeatedly. Possibly slow; enforces its own timeouts.
/// The scheduler trusts implementations to eventually return - a worker
/// that never does permanently occupies one concurrency slot (known
/// limitation, not silently handled).
///
/// Implementations:
/// - GitMetaFetcher: mirrors the target's META git repo (infra-system)
#[async_trait]
pub trait MetaFetcher: Send + Sync {
    /// Run one poll attempt for `target_id`.
    async fn fetch(&self, target_id: &str, spec: &FetchSpec) -> Result<(), FetchFailure>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tokio::sync::watch;

    /// Mock worker behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed instantly
        Success,
        /// Always fail with stage/message
        Fail(String, String),
        /// Fail only for the named target, succeed for the rest
        FailFor(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep before succeeding
        Delay(Duration),
        /// Succeed only once `release()` is called
        BlockUntilReleased,
    }

    /// One observed poll invocation
    #[derive(Debug, Clone)]
    pub struct PollCall {
        pub target_id: String,
        pub started: Instant,
    }

    /// Mock ingestion worker for scheduler tests.
    ///
    /// Records every invocation, tracks the concurrent in-flight high-water
    /// mark and flags overlapping invocations of the same target.
    pub struct MockMetaFetcher {
        behavior: MockBehavior,
        calls: Mutex<Vec<PollCall>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        in_flight_targets: Mutex<HashSet<String>>,
        overlap_detected: AtomicBool,
        release_tx: watch::Sender<bool>,
        release_rx: watch::Receiver<bool>,
    }

    impl MockMetaFetcher {
        pub fn new(behavior: MockBehavior) -> Self {
            let (release_tx, release_rx) = watch::channel(false);
            Self {
                behavior,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                in_flight_targets: Mutex::new(HashSet::new()),
                overlap_detected: AtomicBool::new(false),
                release_tx,
                release_rx,
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(stage: impl Into<String>, message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(stage.into(), message.into()))
        }

        /// Unblock all workers created with `MockBehavior::BlockUntilReleased`
        pub fn release(&self) {
            let _ = self.release_tx.send(true);
        }

        pub fn calls(&self) -> Vec<PollCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn call_count_for(&self, target_id: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.target_id == target_id)
                .count()
        }

        /// Highest number of simultaneously in-flight invocations observed
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        /// Whether two invocations of the same target ever overlapped
        pub fn overlap_detected(&self) -> bool {
            self.overlap_detected.load(Ordering::SeqCst)
        }

        fn enter(&self, target_id: &str) {
            self.calls.lock().unwrap().push(PollCall {
                target_id: target_id.to_string(),
                started: Instant::now(),
            });
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
            if !self
                .in_flight_targets
                .lock()
                .unwrap()
                .insert(target_id.to_string())
            {
                self.overlap_detected.store(true, Ordering::SeqCst);
            }
        }

        fn exit(&self, target_id: &str) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.in_flight_targets.lock().unwrap().remove(target_id);
        }
    }

    #[async_trait]
    impl MetaFetcher for MockMetaFetcher {
        async fn fetch(&self, target_id: &str, _spec: &FetchSpec) -> Result<(), FetchFailure> {
            self.enter(target_id);

            let result = match &self.behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(stage, message) => {
                    Err(FetchFailure::new(stage.clone(), message.clone()))
                }
                MockBehavior::FailFor(failing_id) => {
                    if target_id == failing_id {
                        Err(FetchFailure::new("fetch", "permanent failure"))
                    } else {
                        Ok(())
                    }
                }
                MockBehavior::Panic(message) => {
                    // No exit() on purpose: panic unwinds out of the worker
                    panic!("{}", message);
                }
                MockBehavior::Delay(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                MockBehavior::BlockUntilReleased => {
                    let mut rx = self.release_rx.clone();
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
            };

            self.exit(target_id);
            result
        }
    }
}
