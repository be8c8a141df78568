//! Exponential backoff with jitter.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Doubling stops growing past this exponent.
const MAX_EXPONENT: u32 = 20;

/// Per-key retry delay state.
///
/// The delay doubles with each consecutive retryable failure and is capped at
/// `max_delay_ms`. Jitter is added below the cap and subtracted from it once
/// the doubling reaches it, so keys in a long outage keep spreading out. A
/// retry-after hint from the exchange takes precedence when it is longer than
/// the computed delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Register a failure and return the delay before the next attempt.
    pub fn next_delay(&mut self, retry_after: Option<Duration>) -> Duration {
        let jitter_ratio = self.config.jitter_ratio;
        self.next_delay_with(retry_after, |max_jitter_ms| {
            if jitter_ratio > 0.0 && max_jitter_ms > 0 {
                rand::thread_rng().gen_range(0..=max_jitter_ms)
            } else {
                0
            }
        })
    }

    fn next_delay_with(
        &mut self,
        retry_after: Option<Duration>,
        jitter: impl FnOnce(u64) -> u64,
    ) -> Duration {
        self.attempt = self.attempt.saturating_add(1);

        let exponent = self.attempt.saturating_sub(1).min(MAX_EXPONENT);
        let base = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);
        let max_jitter_ms = (base as f64 * self.config.jitter_ratio) as u64;
        let jitter_ms = jitter(max_jitter_ms).min(max_jitter_ms);
        let jittered = base.saturating_add(jitter_ms);
        let delay_ms = if jittered <= self.config.max_delay_ms {
            jittered
        } else {
            self.config.max_delay_ms.saturating_sub(jitter_ms)
        };

        let delay = Duration::from_millis(delay_ms);
        match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(jitter_ratio: f64) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_ratio,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let mut backoff = Backoff::new(config(0.0));
        let delays: Vec<u64> = (0..8)
            .map(|_| backoff.next_delay(None).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 32000, 60000, 60000]);
        assert_eq!(backoff.attempt(), 8);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(config(0.0));
        backoff.next_delay(None);
        backoff.next_delay(None);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(None), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_bounds() {
        let mut backoff = Backoff::new(config(0.2));
        for _ in 0..50 {
            backoff.reset();
            let delay = backoff.next_delay(None).as_millis() as u64;
            assert!((1000..=1200).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max() {
        let mut backoff = Backoff::new(config(1.0));
        for _ in 0..20 {
            assert!(backoff.next_delay(None) <= Duration::from_millis(60_000));
        }
    }

    #[test]
    fn test_delays_at_cap_still_vary() {
        let mut backoff = Backoff::new(config(0.2));
        for _ in 0..10 {
            backoff.next_delay(None);
        }
        let delays: HashSet<u64> = (0..50)
            .map(|_| backoff.next_delay(None).as_millis() as u64)
            .collect();
        assert!(delays.len() > 1, "delays at the cap are all {delays:?}");
        assert!(delays.iter().all(|d| (48_000..=60_000).contains(d)));
    }

    #[test]
    fn test_injected_jitter_at_cap_is_subtracted() {
        let mut backoff = Backoff::new(config(0.2));
        for _ in 0..6 {
            backoff.next_delay_with(None, |_| 0);
        }
        let delay = backoff.next_delay_with(None, |max| {
            assert_eq!(max, 12_000);
            max
        });
        assert_eq!(delay, Duration::from_millis(48_000));
    }

    #[test]
    fn test_injected_jitter() {
        let mut backoff = Backoff::new(config(0.5));
        let delay = backoff.next_delay_with(None, |max| {
            assert_eq!(max, 500);
            max
        });
        assert_eq!(delay, Duration::from_millis(1500));
    }

    #[test]
    fn test_retry_after_hint_wins_when_longer() {
        let mut backoff = Backoff::new(config(0.0));
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        // Computed 2s beats a 500ms hint
        assert_eq!(
            backoff.next_delay(Some(Duration::from_millis(500))),
            Duration::from_secs(2)
        );
        // Hints beyond the cap are honored
        assert_eq!(
            backoff.next_delay(Some(Duration::from_secs(120))),
            Duration::from_secs(120)
        );
    }
}
