use std::time::Duration;

use time::OffsetDateTime;

/// Clock abstraction.
///
/// `interval_until` exists separately from `now` so that test setups can
/// scale wait times without touching instant comparisons; it feeds timer
/// scheduling and nothing else.
pub trait TimeSource {
    fn now(&self) -> OffsetDateTime;

    /// Time from now until `instant`. Negative intervals clamp to zero.
    fn interval_until(&self, instant: OffsetDateTime) -> Duration {
        non_negative(instant - self.now())
    }
}

/// Timer delays are unsigned; anything already in the past is due now.
fn non_negative(interval: time::Duration) -> Duration {
    interval.try_into().unwrap_or(Duration::ZERO)
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
