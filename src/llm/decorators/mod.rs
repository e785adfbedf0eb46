/// Model decorators for adding behavior to base model implementations.
///
/// Every decorator implements [`Model`](crate::llm::Model) itself and holds the
/// model it wraps as a named field, forwarding to it explicitly. They compose
/// outer-to-inner in whatever order the caller nests them; the
/// [`ModelFactory`](crate::llm::ModelFactory) applies a fixed sensible order.
///
/// # Available Decorators
///
/// - **Cache**: serve identical conversations from a backing store
/// - **Retry**: re-invoke the inner model a bounded number of times
/// - **Timeout**: give each call a deadline
/// - **ConcurrencyLimit**: bound how many calls run at once
/// - **RateLimit**: space out call starts
/// - **FallbackChain**: try distinct models in order
/// - **TwoStageReason**: simulate reasoning with a second model
/// - **RoleRemapper / MapMessages**: rewrite messages before they reach a backend
/// - **UsageCounting**: report usage into a shared counter
/// - **Logging**: emit one structured record per call
pub mod cache;
pub mod concurrency;
pub mod fallback;
pub mod logging;
pub mod map;
pub mod rate_limit;
pub mod reason;
pub mod retry;
pub mod timeout;
pub mod usage_counting;

pub use cache::Cache;
pub use concurrency::{ConcurrencyLimit, ConcurrencyLimiter};
pub use fallback::FallbackChain;
pub use logging::{JsonModelLogger, LogError, Logging, ModelCallRecord, ModelLogger, TracingModelLogger};
pub use map::{MapMessages, MessageMap, ReasoningRemap, RoleRemapper};
pub use rate_limit::RateLimit;
pub use reason::TwoStageReason;
pub use retry::Retry;
pub use timeout::Timeout;
pub use usage_counting::UsageCounting;
