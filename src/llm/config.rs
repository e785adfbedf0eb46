use crate::llm::message::Role;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the retry count.
pub const ENV_RETRIES: &str = "LOOMSTACK_RETRIES";
/// Environment variable holding the delay between retries, e.g. `500ms`.
pub const ENV_RETRY_DELAY: &str = "LOOMSTACK_RETRY_DELAY";
/// Environment variable holding the per-call timeout, e.g. `30s`.
pub const ENV_TIMEOUT: &str = "LOOMSTACK_TIMEOUT";
/// Environment variable holding the maximum number of concurrent calls.
pub const ENV_MAX_CONCURRENT: &str = "LOOMSTACK_MAX_CONCURRENT";
/// Environment variable holding the minimum interval between call starts.
pub const ENV_MIN_INTERVAL: &str = "LOOMSTACK_MIN_INTERVAL";
/// Environment variable holding the cache salt.
pub const ENV_CACHE_SALT: &str = "LOOMSTACK_CACHE_SALT";

const DEFAULT_REASONING_PREFIX: &str =
    "The following information outlines some reasoning about the conversation up to this point:\n\n";

const DEFAULT_REASONING_PROMPT: &str = "
- You are a specialised reasoning AI, tasked with reasoning about another AIs task.
- Your job is to provide prior reasoning another AI model, to assist it in answering its question accurately.
- You should look at the messages up to then end of the conversation, along with the following system prompt (for the other model), and reason.
\t- Following system prompts will be designed for the other model - this system prompt will always be valid.
- You should think step-by-step, breaking your answer down into small chunks.
";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: String, value: String },
    #[error("{name} must be a duration such as `250ms` or `30s`, got {value:?}")]
    InvalidDuration {
        name: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("{0} must be greater than zero")]
    Zero(String),
}

/// Configuration for the retry decorator.
///
/// A call is attempted `max_retries + 1` times, with a fixed `delay` between
/// attempts and none after the last.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (0 means a single attempt).
    pub max_retries: usize,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    /// Three retries, one second apart.
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Retries without waiting between attempts.
    pub fn immediate(max_retries: usize) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    /// A single attempt.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Configuration for the timeout decorator.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    pub timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// Configuration for the concurrency limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    pub max_concurrent: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_concurrent: 1 }
    }
}

/// Configuration for the rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Minimum time between the starts of two consecutive calls.
    pub min_interval: Duration,
}

impl RateLimitConfig {
    /// Allows up to `calls` call starts per `period`.
    pub fn per(calls: u32, period: Duration) -> Self {
        Self {
            min_interval: period / calls.max(1),
        }
    }
}

/// Configuration for the cache decorator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheConfig {
    /// Distinguishes otherwise identical conversations sent to different
    /// underlying configurations, e.g. the backend model name.
    pub salt: String,
}

impl CacheConfig {
    pub fn salted(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

/// Configuration for two-stage reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoStageReasonConfig {
    /// System instruction prepended to the conversation sent to the reasoner.
    pub reasoning_prompt: String,
}

impl Default for TwoStageReasonConfig {
    fn default() -> Self {
        Self {
            reasoning_prompt: DEFAULT_REASONING_PROMPT.to_string(),
        }
    }
}

/// Configuration for the role remapper.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleRemapConfig {
    /// Role that rewritten messages carry.
    pub target_role: Role,
    /// Text placed before the content of rewritten messages.
    pub prefix: String,
}

impl Default for RoleRemapConfig {
    fn default() -> Self {
        Self {
            target_role: Role::System,
            prefix: DEFAULT_REASONING_PREFIX.to_string(),
        }
    }
}

/// Which decorators [`ModelFactory`](crate::llm::ModelFactory) applies.
///
/// `None` leaves a layer out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackConfig {
    pub retry: Option<RetryConfig>,
    pub timeout: Option<TimeoutConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub cache: CacheConfig,
}

impl StackConfig {
    /// Reads the stack configuration from the process environment, after
    /// loading a `.env` file if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let retries = lookup(ENV_RETRIES)
            .map(|value| parse_count(ENV_RETRIES, &value))
            .transpose()?;
        let delay = lookup(ENV_RETRY_DELAY)
            .map(|value| parse_duration(ENV_RETRY_DELAY, &value))
            .transpose()?;
        if retries.is_some() || delay.is_some() {
            config.retry = Some(RetryConfig::new(
                retries.unwrap_or(RetryConfig::default().max_retries),
                delay.unwrap_or(Duration::ZERO),
            ));
        }

        if let Some(value) = lookup(ENV_TIMEOUT) {
            let timeout = parse_duration(ENV_TIMEOUT, &value)?;
            config.timeout = Some(TimeoutConfig { timeout });
        }

        if let Some(value) = lookup(ENV_MAX_CONCURRENT) {
            let max_concurrent = parse_count(ENV_MAX_CONCURRENT, &value)?;
            if max_concurrent == 0 {
                return Err(ConfigError::Zero(ENV_MAX_CONCURRENT.to_string()));
            }
            config.concurrency = Some(ConcurrencyConfig { max_concurrent });
        }

        if let Some(value) = lookup(ENV_MIN_INTERVAL) {
            let min_interval = parse_duration(ENV_MIN_INTERVAL, &value)?;
            config.rate_limit = Some(RateLimitConfig { min_interval });
        }

        if let Some(salt) = lookup(ENV_CACHE_SALT) {
            config.cache = CacheConfig::salted(salt);
        }

        Ok(config)
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn parse_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        name: name.to_string(),
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_disabled_retry_config() {
        let config = RetryConfig::disabled();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.delay, Duration::ZERO);
    }

    #[test]
    fn test_rate_limit_per_period() {
        let config = RateLimitConfig::per(4, Duration::from_secs(1));
        assert_eq!(config.min_interval, Duration::from_millis(250));
        assert_eq!(RateLimitConfig::per(0, Duration::from_secs(1)).min_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_environment_enables_nothing() {
        let config = StackConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn test_full_environment() {
        let config = StackConfig::from_lookup(lookup_from(&[
            (ENV_RETRIES, "2"),
            (ENV_RETRY_DELAY, "250ms"),
            (ENV_TIMEOUT, "30s"),
            (ENV_MAX_CONCURRENT, "4"),
            (ENV_MIN_INTERVAL, "100ms"),
            (ENV_CACHE_SALT, "gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(config.retry, Some(RetryConfig::new(2, Duration::from_millis(250))));
        assert_eq!(config.timeout.unwrap().timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency.unwrap().max_concurrent, 4);
        assert_eq!(config.rate_limit.unwrap().min_interval, Duration::from_millis(100));
        assert_eq!(config.cache.salt, "gpt-4o");
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = StackConfig::from_lookup(lookup_from(&[(ENV_RETRIES, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let err = StackConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));

        let err = StackConfig::from_lookup(lookup_from(&[(ENV_MAX_CONCURRENT, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Zero(_)));
    }
}
