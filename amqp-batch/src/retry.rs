use std::time;

use rand::Rng;
use tokio_util::sync::CancellationToken;

#[derive(Copy, Clone, Debug)]
/// How long to wait between attempts to get back in touch with the broker.
///
/// The wait grows with the square of the attempt number (1, 4, 9, 16, ... times
/// `base_interval`) until it reaches `maximum_interval`.
pub struct ReconnectPolicy {
    /// The wait after the first failed attempt.
    pub base_interval: time::Duration,
    /// Upper bound for the wait, before jitter.
    pub maximum_interval: time::Duration,
    /// Random extra wait, as a fraction of the computed interval.
    pub jitter: f64,
}

impl ReconnectPolicy {
    pub fn new(base_interval: time::Duration, maximum_interval: time::Duration) -> Self {
        Self {
            base_interval,
            maximum_interval,
            ..Default::default()
        }
    }

    pub fn with_jitter(self, jitter: f64) -> Self {
        Self {
            jitter: jitter.max(0.0),
            ..self
        }
    }

    /// Wait before retrying after failed attempt number `attempt` (starting at 1), without jitter.
    pub fn interval(&self, attempt: u32) -> time::Duration {
        let factor = attempt.max(1).saturating_mul(attempt.max(1));
        let candidate = self.base_interval.saturating_mul(factor);

        std::cmp::min(candidate, self.maximum_interval)
    }

    pub fn interval_with_jitter(&self, attempt: u32) -> time::Duration {
        let interval = self.interval(attempt);
        if self.jitter == 0.0 {
            return interval;
        }

        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        interval + interval.mul_f64(extra)
    }

    /// Sleeps for the attempt's interval. Returns `false` if `cancel` fired first.
    pub async fn wait(&self, attempt: u32, cancel: &CancellationToken) -> bool {
        let interval = self.interval_with_jitter(attempt);

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_interval: time::Duration::from_secs(1),
            maximum_interval: time::Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_case::test_case;

    #[test_case(1 => 1; "first")]
    #[test_case(2 => 4; "second")]
    #[test_case(3 => 9; "third")]
    #[test_case(5 => 25; "fifth")]
    #[test_case(6 => 30; "capped")]
    #[test_case(u32::MAX => 30; "no overflow")]
    fn interval_grows_quadratically_up_to_the_cap(attempt: u32) -> u64 {
        ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30))
            .interval(attempt)
            .as_secs()
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(30))
            .with_jitter(0.5);

        for _ in 0..100 {
            let interval = policy.interval_with_jitter(2);
            assert!(interval >= Duration::from_secs(4));
            assert!(interval <= Duration::from_secs(6));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_early_on_cancellation() {
        let policy = ReconnectPolicy::new(Duration::from_secs(60), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = tokio::time::Instant::now();
        assert!(!policy.wait(1, &cancel).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_for_the_interval() {
        let policy = ReconnectPolicy::new(Duration::from_millis(10), Duration::from_secs(1))
            .with_jitter(0.0);
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        assert!(policy.wait(3, &cancel).await);
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}
