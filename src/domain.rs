//! Validated domain values used across the crate
//!
//! Bounded configuration values are newtypes with range validation so that an
//! out-of-range setting is rejected at construction rather than at dispatch.

use nutype::nutype;

/// Deduplication window length for one `(message class, handler)` pair.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 100
)]
pub struct DdqCapacity(usize);

impl DdqCapacity {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Consecutive handler failures before a circuit breaker opens.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 5
)]
pub struct CircuitBreakerThreshold(u32);

impl CircuitBreakerThreshold {
    /// Gets the value as u32
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.into_inner()
    }
}

/// Cooldown before an open circuit breaker admits a trial call.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 86_400_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30_000
)]
pub struct CircuitBreakerCooldownMs(u64);

impl CircuitBreakerCooldownMs {
    /// Converts to Duration
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// Upper bound on concurrently executing handler invocations.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 65_536),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 64
)]
pub struct MaxConcurrency(usize);

impl MaxConcurrency {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddq_capacity_defaults_to_spec_window() {
        assert_eq!(DdqCapacity::default().as_usize(), 100);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(DdqCapacity::try_new(0).is_err());
        assert!(CircuitBreakerThreshold::try_new(0).is_err());
        assert!(MaxConcurrency::try_new(0).is_err());
        assert!(MaxConcurrency::try_new(100_000).is_err());
    }
}
