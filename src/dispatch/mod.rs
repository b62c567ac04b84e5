//! Concurrent dispatch: worker scheduling, circuit breaking, configuration
//!
//! The dispatcher fans a decoded message out to every matching subscription
//! on an elastic blocking pool. See [`Dispatcher::route`] for the delivery
//! algorithm.

mod breaker;
mod config;
mod dispatcher;

pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{DispatcherConfig, DispatcherConfigBuilder};
pub use dispatcher::{Dispatcher, DispatcherStatus};
