use rand::Rng;
use std::time::Duration;

/// Randomised wait of `min_delay + uniform(0..=jitter)`.
///
/// Used for the politeness delay between extraction tasks and for the settle
/// time after a search page loads. `PacingPolicy::none()` makes both instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub min_delay: Duration,
    pub jitter: Duration,
}

impl PacingPolicy {
    pub fn new(min_delay: Duration, jitter: Duration) -> Self {
        Self { min_delay, jitter }
    }

    pub fn from_millis(min_ms: u64, jitter_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(jitter_ms))
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draw the next delay
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.min_delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.min_delay + Duration::from_millis(extra)
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from_millis(2000, 2000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_stays_within_bounds() {
        let policy = PacingPolicy::from_millis(100, 50);
        for _ in 0..200 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = PacingPolicy::from_millis(250, 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
        assert_eq!(PacingPolicy::none().next_delay(), Duration::ZERO);
    }
}
