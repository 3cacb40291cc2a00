// Target Domain Model

use serde::{Deserialize, Serialize};

/// Target ID (unique name of one monitored SoC platform)
pub type TargetId = String;

/// Fetch specification (opaque to the core, interpreted by the ingestion
/// worker - typically carries the META repo location)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSpec(serde_json::Value);

impl FetchSpec {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Last recorded failure for a target, kept in memory for observability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub target_id: TargetId,
    pub stage: String,
    pub message: String,
    pub timestamp_ms: i64,
}

/// One monitored SoC platform.
///
/// Owned exclusively by the poll scheduler: created at registry load time,
/// mutated only at the scheduler's result-collection point, never removed
/// while the process runs.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub fetch_spec: FetchSpec,
    /// Start time of the most recent poll attempt (dispatch time)
    pub last_attempt_ms: Option<i64>,
    pub last_success_ms: Option<i64>,
    pub last_error: Option<ErrorRecord>,
    pub consecutive_failures: u32,
}

impl Target {
    pub fn new(id: impl Into<TargetId>, fetch_spec: FetchSpec) -> Self {
        Self {
            id: id.into(),
            fetch_spec,
            last_attempt_ms: None,
            last_success_ms: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// Whether the target is due for another poll attempt.
    ///
    /// Never-attempted targets are always eligible; otherwise eligibility is
    /// purely `now - last_attempt >= interval`. Failures do not change the
    /// cadence (fixed-interval retry, no backoff).
    pub fn is_eligible(&self, now_ms: i64, interval_ms: i64) -> bool {
        match self.last_attempt_ms {
            None => true,
            Some(attempt) => now_ms - attempt >= interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("sdm845-la-2-0", FetchSpec::new(serde_json::json!({})))
    }

    #[test]
    fn never_attempted_target_is_eligible() {
        assert!(target().is_eligible(0, 3_600_000));
    }

    #[test]
    fn eligibility_follows_interval() {
        let mut t = target();
        t.last_attempt_ms = Some(1_000);

        assert!(!t.is_eligible(1_500, 1_000), "half an interval elapsed");
        assert!(t.is_eligible(2_000, 1_000), "exactly one interval elapsed");
        assert!(t.is_eligible(5_000, 1_000));
    }

    #[test]
    fn failures_do_not_alter_eligibility() {
        let mut t = target();
        t.last_attempt_ms = Some(0);
        t.consecutive_failures = 17;

        assert!(t.is_eligible(1_000, 1_000));
        assert!(!t.is_eligible(999, 1_000));
    }
}
