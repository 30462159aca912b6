//! Failure counting with hysteresis.
//!
//! Every failure pushes the count up by one; every success lets it down by
//! one. The exporter tolerates a flaky cluster as long as successes keep
//! pace, and gives up only once failures have outrun them by `threshold`.

use std::num::NonZeroU32;

use tracing::{debug, warn};

use crate::error::CollectError;

#[derive(Debug)]
pub struct FailureCounter {
    count: u32,
    threshold: NonZeroU32,
    /// Most recent failure. Successes do not clear it.
    last_error: Option<CollectError>,
}

impl FailureCounter {
    pub fn new(threshold: NonZeroU32) -> Self {
        Self {
            count: 0,
            threshold,
            last_error: None,
        }
    }

    /// Record one outcome: `Some` is a failure, `None` a success.
    pub fn record(&mut self, outcome: Option<CollectError>) {
        match outcome {
            Some(error) => {
                self.count = self.count.saturating_add(1);
                if self.count == self.threshold.get() {
                    warn!(
                        failures = self.count,
                        threshold = self.threshold.get(),
                        error = %error,
                        "failure threshold reached"
                    );
                }
                self.last_error = Some(error);
            }
            None => {
                if self.count > 0 {
                    self.count -= 1;
                    debug!(failures = self.count, "failure count decreased");
                }
            }
        }
    }

    /// Whether failures have outrun successes by the threshold.
    pub fn should_abort(&self) -> bool {
        self.count >= self.threshold.get()
    }

    /// Whether any failure is outstanding.
    pub fn is_degraded(&self) -> bool {
        self.count > 0
    }

    pub fn last_error(&self) -> Option<&CollectError> {
        self.last_error.as_ref()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> NonZeroU32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagwatch_client::ClientError;

    fn counter(threshold: u32) -> FailureCounter {
        FailureCounter::new(NonZeroU32::new(threshold).unwrap())
    }

    fn failure(n: u32) -> Option<CollectError> {
        Some(CollectError::InternalFault(format!("failure {n}")))
    }

    #[test]
    fn starts_healthy() {
        let c = counter(10);
        assert_eq!(c.count(), 0);
        assert!(!c.is_degraded());
        assert!(!c.should_abort());
        assert!(c.last_error().is_none());
    }

    #[test]
    fn success_never_goes_negative() {
        let mut c = counter(3);
        for _ in 0..5 {
            c.record(None);
        }
        assert_eq!(c.count(), 0);

        c.record(failure(1));
        c.record(None);
        c.record(None);
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn steps_are_exactly_one() {
        let mut c = counter(100);
        // Deterministic mixed sequence: failure on every index not divisible by 3.
        let mut expected: u32 = 0;
        for i in 0..60u32 {
            let before = c.count();
            if i % 3 == 0 {
                c.record(None);
                expected = expected.saturating_sub(1);
                assert!(before - c.count() <= 1);
            } else {
                c.record(failure(i));
                expected += 1;
                assert_eq!(c.count(), before + 1);
            }
            assert_eq!(c.count(), expected);
        }
    }

    #[test]
    fn ten_failures_trip_and_one_success_untrips() {
        let mut c = counter(10);
        for i in 0..9 {
            c.record(failure(i));
            assert!(!c.should_abort(), "tripped early at {}", c.count());
        }
        c.record(failure(9));
        assert!(c.should_abort());

        c.record(None);
        assert_eq!(c.count(), 9);
        assert!(!c.should_abort());
    }

    #[test]
    fn degraded_boundary() {
        let mut c = counter(10);
        assert!(!c.is_degraded());
        c.record(failure(0));
        assert_eq!(c.count(), 1);
        assert!(c.is_degraded());
        c.record(None);
        assert!(!c.is_degraded());
    }

    #[test]
    fn last_error_survives_success() {
        let mut c = counter(10);
        c.record(Some(CollectError::Metadata(ClientError::Broker("gone".into()))));
        c.record(None);
        assert_eq!(
            c.last_error(),
            Some(&CollectError::Metadata(ClientError::Broker("gone".into())))
        );

        c.record(failure(7));
        assert_eq!(c.last_error(), Some(&CollectError::InternalFault("failure 7".into())));
    }

    #[test]
    fn threshold_of_one() {
        let mut c = counter(1);
        c.record(failure(0));
        assert!(c.should_abort());
        assert_eq!(c.threshold().get(), 1);
    }
}
