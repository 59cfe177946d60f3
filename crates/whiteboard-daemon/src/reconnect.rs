//! Backoff for re-dialing the index server.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum number of attempts (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            max_attempts: None,
        }
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let delay_secs = config.initial_delay.as_secs_f64()
        * config.backoff_factor.powi(attempt.saturating_sub(1) as i32);

    Duration::from_secs_f64(delay_secs.min(config.max_delay.as_secs_f64()))
}

/// Consecutive failed dials to one target.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return how long to wait before the next dial,
    /// or `None` once the attempt limit is reached.
    pub fn next_delay(&mut self, config: &ReconnectConfig) -> Option<Duration> {
        if self.exceeded_max_attempts(config) {
            return None;
        }
        self.attempts += 1;
        Some(calculate_backoff(self.attempts, config))
    }

    /// Connected again; the next failure starts from the initial delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exceeded_max_attempts(&self, config: &ReconnectConfig) -> bool {
        config
            .max_attempts
            .map(|max| self.attempts >= max)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_exponential() {
        let config = ReconnectConfig::default();

        // 5s, 10s, 20s, ... capped at 60s
        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(5));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(10));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(40));
        assert_eq!(calculate_backoff(5, &config), Duration::from_secs(60));
        assert_eq!(calculate_backoff(20, &config), Duration::from_secs(60));
    }

    #[test]
    fn test_calculate_backoff_custom_config() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_factor: 3.0,
            max_attempts: None,
        };

        assert_eq!(calculate_backoff(1, &config), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, &config), Duration::from_millis(300));
        assert_eq!(calculate_backoff(3, &config), Duration::from_millis(900));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(1));
    }

    #[test]
    fn test_next_delay_grows_until_reset() {
        let config = ReconnectConfig::default();
        let mut state = ReconnectState::new();

        assert_eq!(state.next_delay(&config), Some(Duration::from_secs(5)));
        assert_eq!(state.next_delay(&config), Some(Duration::from_secs(10)));
        assert_eq!(state.attempts(), 2);

        state.reset();
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.next_delay(&config), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_max_attempts() {
        let config = ReconnectConfig {
            max_attempts: Some(2),
            ..Default::default()
        };
        let mut state = ReconnectState::new();

        assert!(state.next_delay(&config).is_some());
        assert!(state.next_delay(&config).is_some());
        assert!(state.exceeded_max_attempts(&config));
        assert_eq!(state.next_delay(&config), None);

        assert!(!state.exceeded_max_attempts(&ReconnectConfig::default()));
    }
}
