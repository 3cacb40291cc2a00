// Wall-Clock Port
//
// Poll eligibility is pure arithmetic over epoch milliseconds, so the
// clock sits behind a trait: scheduler tests pin or step time instead of
// sleeping through real poll intervals.

/// Source of the epoch-millisecond timestamps driving poll scheduling
/// and target failure records.
pub trait TimeProvider: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// System clock (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Steppable clock: time only moves when the test advances it, so
    /// interval eligibility can be exercised without real waits.
    pub struct MockTimeProvider {
        now_ms: AtomicI64,
    }

    impl MockTimeProvider {
        pub fn at(now_ms: i64) -> Self {
            Self {
                now_ms: AtomicI64::new(now_ms),
            }
        }

        pub fn advance(&self, delta_ms: i64) {
            self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl TimeProvider for MockTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }
}
