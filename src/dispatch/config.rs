//! Dispatcher configuration
//!
//! Pre-configured settings for development and production plus a builder for
//! custom tuning. All bounded values are validated domain types, so a config
//! that constructs is a config that is in range.

#![allow(clippy::missing_panics_doc)]

use crate::domain::{CircuitBreakerCooldownMs, CircuitBreakerThreshold, MaxConcurrency};

/// Complete dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently executing handler invocations.
    pub max_concurrency: MaxConcurrency,
    /// Consecutive failures before a handler's breaker opens.
    pub circuit_breaker_threshold: CircuitBreakerThreshold,
    /// Cooldown before an open breaker admits a trial call.
    pub circuit_breaker_cooldown_ms: CircuitBreakerCooldownMs,
}

impl DispatcherConfig {
    /// Development settings: a small pool and a sensitive breaker for fast
    /// feedback while debugging handlers.
    #[must_use]
    pub fn development() -> Self {
        Self {
            max_concurrency: MaxConcurrency::try_new(4).unwrap(),
            circuit_breaker_threshold: CircuitBreakerThreshold::try_new(3).unwrap(),
            circuit_breaker_cooldown_ms: CircuitBreakerCooldownMs::try_new(5_000).unwrap(),
        }
    }

    /// Production settings: pool sized from the host CPU count, a breaker
    /// tolerant of transient flapping.
    #[must_use]
    pub fn production() -> Self {
        let concurrency = (num_cpus::get() * 4).clamp(1, 1024);
        Self {
            max_concurrency: MaxConcurrency::try_new(concurrency).unwrap(),
            circuit_breaker_threshold: CircuitBreakerThreshold::try_new(10).unwrap(),
            circuit_breaker_cooldown_ms: CircuitBreakerCooldownMs::try_new(60_000).unwrap(),
        }
    }

    /// Starts a builder seeded with development settings.
    #[must_use]
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder {
            config: Self::development(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Builder for custom dispatcher configurations.
#[derive(Debug, Clone)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    /// Sets the handler concurrency cap.
    #[must_use]
    pub fn max_concurrency(mut self, value: MaxConcurrency) -> Self {
        self.config.max_concurrency = value;
        self
    }

    /// Sets the breaker failure threshold.
    #[must_use]
    pub fn circuit_breaker_threshold(mut self, value: CircuitBreakerThreshold) -> Self {
        self.config.circuit_breaker_threshold = value;
        self
    }

    /// Sets the breaker cooldown.
    #[must_use]
    pub fn circuit_breaker_cooldown_ms(mut self, value: CircuitBreakerCooldownMs) -> Self {
        self.config.circuit_breaker_cooldown_ms = value;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> DispatcherConfig {
        self.config
    }
}
