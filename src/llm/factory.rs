use crate::llm::cache::ModelResponseCache;
use crate::llm::config::StackConfig;
use crate::llm::core::DynModel;
use crate::llm::decorators::{
    Cache, ConcurrencyLimit, ConcurrencyLimiter, RateLimit, Retry, Timeout, UsageCounting,
};
use crate::llm::error::LlmError;
use crate::llm::usage::UsageCounter;
use std::sync::Arc;

/// Factory for wrapping a base model in the standard decorator stack.
///
/// The layers, outermost first, are:
///
/// 1. usage counting (when a counter is given)
/// 2. cache (when a store is given)
/// 3. retry (when configured with at least one retry)
/// 4. timeout
/// 5. rate limit
/// 6. concurrency limit
///
/// so a cache hit costs nothing, every retry gets a fresh timeout, and a
/// waiting retry does not hold a concurrency permit.
///
/// # Examples
///
/// ```rust,ignore
/// use loomstack::llm::{ModelFactory, StackConfig, UsageCounter};
/// use std::sync::Arc;
///
/// let counter = Arc::new(UsageCounter::new());
/// let model = ModelFactory::new(StackConfig::from_env()?)
///     .with_usage_counter(counter.clone())
///     .build(Arc::new(rig_agent))?;
/// ```
#[derive(Default)]
pub struct ModelFactory {
    config: StackConfig,
    cache: Option<Arc<dyn ModelResponseCache>>,
    counter: Option<Arc<UsageCounter>>,
    limiter: Option<ConcurrencyLimiter>,
}

impl ModelFactory {
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Serve repeated conversations from `store`, keyed with the configured salt.
    pub fn with_cache(mut self, store: Arc<dyn ModelResponseCache>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Report the usage of every call into `counter`.
    pub fn with_usage_counter(mut self, counter: Arc<UsageCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Draw concurrency permits from an existing limiter instead of creating
    /// one from the configuration, so several stacks can share a budget.
    pub fn with_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Wraps `base` in every configured layer.
    pub fn build(&self, base: DynModel) -> Result<DynModel, LlmError> {
        let mut model = base;

        let limiter = match (&self.limiter, &self.config.concurrency) {
            (Some(limiter), _) => Some(limiter.clone()),
            (None, Some(config)) => Some(ConcurrencyLimiter::from_config(config)?),
            (None, None) => None,
        };
        if let Some(limiter) = limiter {
            tracing::debug!(max_concurrent = limiter.capacity(), "Wrapping model with concurrency limit");
            model = Arc::new(ConcurrencyLimit::new(model, limiter));
        }

        if let Some(config) = &self.config.rate_limit {
            tracing::debug!(min_interval_ms = config.min_interval.as_millis() as u64, "Wrapping model with rate limit");
            model = Arc::new(RateLimit::new(model, config.clone()));
        }

        if let Some(config) = &self.config.timeout {
            tracing::debug!(timeout_ms = config.timeout.as_millis() as u64, "Wrapping model with timeout");
            model = Arc::new(Timeout::new(model, config.clone()));
        }

        match &self.config.retry {
            Some(config) if config.max_retries > 0 => {
                tracing::debug!(
                    max_retries = config.max_retries,
                    delay_ms = config.delay.as_millis() as u64,
                    "Wrapping model with retry decorator"
                );
                model = Arc::new(Retry::new(model, config.clone()));
            }
            Some(_) => {
                tracing::debug!("Retry config provided but max_retries is 0, skipping retry");
            }
            None => {}
        }

        if let Some(store) = &self.cache {
            tracing::debug!(salt = %self.config.cache.salt, "Wrapping model with cache");
            model = Arc::new(Cache::new(model, store.clone(), self.config.cache.clone()));
        }

        if let Some(counter) = &self.counter {
            model = Arc::new(UsageCounting::new(model, counter.clone()));
        }

        Ok(model)
    }

    /// Wraps `base` using only `config`, with no cache or usage counter.
    pub fn create(base: DynModel, config: StackConfig) -> Result<DynModel, LlmError> {
        Self::new(config).build(base)
    }
}
