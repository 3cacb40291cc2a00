// Scheduler constants (no magic values)
use std::time::Duration;

/// Control loop tick: how often eligibility is re-evaluated (100ms)
pub const SCHEDULER_TICK: Duration = Duration::from_millis(100);

/// Default spacing between poll attempts of one target (seconds).
/// Observed deployments use one to two hours; this is pure configuration.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3600;

/// Default bound on simultaneously in-flight ingestion workers
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
