//! Queue configuration.

use std::time::Duration;

use crate::types::RetryPolicy;

pub const ENV_INTERVAL_MS: &str = "FULFILLMENT_INTERVAL_MS";
pub const ENV_BATCH_SIZE: &str = "FULFILLMENT_BATCH_SIZE";
pub const ENV_MAX_ATTEMPTS: &str = "FULFILLMENT_MAX_ATTEMPTS";
pub const ENV_PROVIDER_TIMEOUT_MS: &str = "FULFILLMENT_PROVIDER_TIMEOUT_MS";
pub const ENV_START_DELAY_MS: &str = "FULFILLMENT_START_DELAY_MS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "FULFILLMENT_RETRY_BASE_DELAY_MS";

/// Shortest sweep interval; `tokio::time::interval` panics on zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Queue processor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Maximum jobs claimed per sweep
    pub batch_size: usize,
    /// Deadline for a single provider submission
    pub provider_timeout: Duration,
    /// Pause before the worker starts the processor
    pub start_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            batch_size: 10,
            provider_timeout: Duration::from_secs(30),
            start_delay: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Read overrides from the process environment; unset keys keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = read(&lookup, ENV_INTERVAL_MS, false)? {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(n) = read(&lookup, ENV_BATCH_SIZE, false)? {
            config.batch_size = usize::try_from(n).map_err(|_| ConfigError::Invalid {
                key: ENV_BATCH_SIZE,
                value: n.to_string(),
            })?;
        }
        if let Some(n) = read(&lookup, ENV_MAX_ATTEMPTS, false)? {
            config.retry.max_attempts = u32::try_from(n).map_err(|_| ConfigError::Invalid {
                key: ENV_MAX_ATTEMPTS,
                value: n.to_string(),
            })?;
        }
        if let Some(ms) = read(&lookup, ENV_PROVIDER_TIMEOUT_MS, false)? {
            config.provider_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read(&lookup, ENV_START_DELAY_MS, true)? {
            config.start_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = read(&lookup, ENV_RETRY_BASE_DELAY_MS, true)? {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn read<F>(lookup: &F, key: &'static str, allow_zero: bool) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.clone(),
    })?;
    if value == 0 && !allow_zero {
        return Err(ConfigError::Zero { key });
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.interval, Duration::from_millis(30_000));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.start_delay, Duration::from_secs(5));
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        assert_eq!(QueueConfig::from_lookup(lookup(&[])), Ok(QueueConfig::default()));
    }

    #[test]
    fn overrides_are_applied() {
        let config = QueueConfig::from_lookup(lookup(&[
            (ENV_INTERVAL_MS, "1000"),
            (ENV_BATCH_SIZE, "25"),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_START_DELAY_MS, "0"),
            (ENV_RETRY_BASE_DELAY_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.start_delay, Duration::ZERO);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(
            QueueConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "ten")])),
            Err(ConfigError::Invalid {
                key: ENV_BATCH_SIZE,
                value: "ten".to_string()
            })
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert_eq!(
            QueueConfig::from_lookup(lookup(&[(ENV_INTERVAL_MS, "0")])),
            Err(ConfigError::Zero {
                key: ENV_INTERVAL_MS
            })
        );
    }

    #[test]
    fn builder_raises_zero_interval_to_minimum() {
        let config = QueueConfig::default().with_interval(Duration::ZERO);
        assert_eq!(config.interval, MIN_INTERVAL);

        let config = QueueConfig::default().with_interval(Duration::from_millis(250));
        assert_eq!(config.interval, Duration::from_millis(250));
    }
}
