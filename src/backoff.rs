use std::time::Duration;

/// Randomized exponential back-off for transient refresh failures.
///
/// The next timeout is `clamp(uniform(0, last) + last * multiplier, min, max)`.
/// A fresh sequence (last = 0) starts at `min_timeout` and every retry lands
/// between two and three times the previous one until `max_timeout` is
/// reached. The jitter does not need a cryptographic source.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(7200),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    pub fn next_timeout(&self, last_timeout: Duration) -> Duration {
        use rand::Rng;

        let last = last_timeout.as_secs_f64();
        let jitter = rand::rng().random_range(0.0..=last);
        let next = jitter + last * self.multiplier;
        Duration::from_secs_f64(next.clamp(
            self.min_timeout.as_secs_f64(),
            self.max_timeout.as_secs_f64(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn first_retry_uses_the_minimum() {
        let backoff = Backoff::default();
        assert_that(backoff.next_timeout(Duration::ZERO)).is_equal_to(Duration::from_secs(1));
    }

    #[test]
    fn retries_grow_between_two_and_three_times_the_last_timeout() {
        let backoff = Backoff::default();
        for _ in 0..50 {
            let next = backoff.next_timeout(Duration::from_secs(10));
            assert_that(next >= Duration::from_secs(20)).is_true();
            assert_that(next <= Duration::from_secs(30)).is_true();
        }
    }

    #[test]
    fn timeouts_are_clamped_to_the_maximum() {
        let backoff = Backoff::default();
        let next = backoff.next_timeout(Duration::from_secs(7200));
        assert_that(next).is_equal_to(Duration::from_secs(7200));
    }
}
