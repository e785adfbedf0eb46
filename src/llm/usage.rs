use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::Mutex;

/// Token and call accounting for one or more model calls.
///
/// `Usage` is additive: the zero value is the identity and `+` is
/// commutative, so usage can be folded across retries, fallbacks and
/// composed calls in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
}

impl Usage {
    /// Usage of a single successful backend call.
    pub fn success(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            successful_calls: 1,
            failed_calls: 0,
        }
    }

    /// Usage of a single failed backend call.
    pub fn failure() -> Self {
        Self {
            failed_calls: 1,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn total_calls(&self) -> u64 {
        self.successful_calls + self.failed_calls
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, other: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            successful_calls: self.successful_calls + other.successful_calls,
            failed_calls: self.failed_calls + other.failed_calls,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        *self = *self + other;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Usage {
        iter.fold(Usage::default(), Add::add)
    }
}

/// A concurrency-safe running total of [`Usage`].
///
/// Share it behind an `Arc` between any number of
/// [`UsageCounting`](crate::llm::decorators::UsageCounting) decorators.
#[derive(Debug, Default)]
pub struct UsageCounter {
    usage: Mutex<Usage>,
}

impl UsageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `usage` into the total.
    pub fn add(&self, usage: Usage) {
        let mut total = self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *total += usage;
    }

    /// Returns the current total.
    pub fn get(&self) -> Usage {
        *self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
