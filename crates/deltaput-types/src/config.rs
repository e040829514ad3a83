//! Configuration value types for deltaput
//!
//! These are small validated wrappers shared by the config crate and the
//! upload engine.

use std::time::Duration;

/// Worker pool size with validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Minimum worker count
    pub const MIN: usize = 1;
    /// Maximum worker count
    pub const MAX: usize = 256;

    /// Create a new worker count with validation
    pub fn new(count: usize) -> Result<Self, String> {
        if count < Self::MIN {
            Err(format!("Worker count {} is below minimum {}", count, Self::MIN))
        } else if count > Self::MAX {
            Err(format!("Worker count {} exceeds maximum {}", count, Self::MAX))
        } else {
            Ok(Self(count))
        }
    }

    /// Get the worker count value
    pub fn get(self) -> usize {
        self.0
    }

    /// Twice the number of logical CPUs, uploads being mostly network bound
    pub fn optimal() -> Self {
        Self((num_cpus::get() * 2).clamp(Self::MIN, Self::MAX))
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::optimal()
    }
}

/// Retry configuration for recoverable upload failures
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryConfig {
    /// Maximum number of attempts per file, the first one included
    pub max_attempts: u32,
    /// Base delay, multiplied by `backoff_multiplier ^ attempts`
    pub initial_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default ceiling on attempts per file
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

    /// Create a new retry configuration
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, String> {
        if max_attempts == 0 {
            return Err("Max attempts must be at least 1".to_string());
        }
        if backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be at least 1.0".to_string());
        }
        if initial_delay > max_delay {
            return Err("Initial delay cannot be greater than max delay".to_string());
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
        })
    }

    /// Calculate the backoff delay after `attempts` failed attempts
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempts as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}
