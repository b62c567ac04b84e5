//! # Courier - Typed Publish/Subscribe Messaging Middleware
//!
//! Courier is a message-oriented middleware core: a publish/subscribe
//! dispatch engine for typed, self-describing messages in a single process,
//! with pluggable transports that may cross processes. It provides:
//!
//! - **Message schemas**: declarative property system with defaults,
//!   required fields, validators, transformers, aliases, and versioned
//!   headers carrying routing metadata
//! - **Filtered subscriptions**: declarative `from`/`to`/`broadcast`
//!   criteria with exact and pattern matchers
//! - **Concurrent dispatch**: every matching handler runs on an elastic
//!   worker pool, isolated by per-handler circuit breakers
//! - **Deduplication**: bounded per-subscription UUID windows with
//!   in-memory and Redis-backed storage
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier::{
//!     Dispatcher, DispatcherConfig, Filter, Handler, LoopbackTransport,
//!     MessageClass, PropertySpec, Transport,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new(DispatcherConfig::development());
//! let transport: Arc<dyn Transport> =
//!     Arc::new(LoopbackTransport::new(dispatcher.clone()));
//!
//! let alert = MessageClass::builder("Alert")
//!     .from("monitoring")
//!     .property(PropertySpec::new("severity").required())
//!     .property(PropertySpec::new("message").default_value(""))
//!     .transport(transport)
//!     .build()?;
//!
//! alert.subscribe(
//!     Filter::builder().broadcast(true).build()?,
//!     Handler::unified(|message| {
//!         println!("alert: {:?}", message.get("severity"));
//!         Ok(())
//!     }),
//! )?;
//!
//! let mut message = alert.new_message(serde_json::from_value(
//!     serde_json::json!({ "severity": "warn" }),
//! )?)?;
//! alert.publish(&mut message).await?;
//!
//! dispatcher.shutdown(std::time::Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery semantics
//!
//! Delivery is at-most-once per handler once dedup is enabled: a dedup check
//! runs before each invocation and the UUID is marked only after the handler
//! returns successfully. There is no ordering guarantee between handlers of
//! one message nor between messages. Handler failures never propagate to the
//! publisher; they are logged and counted by the handler's circuit breaker.

pub mod ddq;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod filter;
pub mod header;
pub mod message;
pub mod message_class;
pub mod registry;
pub mod schema;
pub mod serializer;
pub mod transport;

pub use ddq::{DdqKey, DdqStats, DdqStorage, DdqStore, DedupPolicy, MemoryDdq, RedisDdq, RedisDdqOptions};
pub use dispatch::{
    BreakerState, CircuitBreaker, Dispatcher, DispatcherConfig, DispatcherConfigBuilder,
    DispatcherStatus,
};
pub use domain::{CircuitBreakerCooldownMs, CircuitBreakerThreshold, DdqCapacity, MaxConcurrency};
pub use error::{
    DdqError, DispatchError, FilterError, MessageError, PublishError, SchemaError, TransportError,
    ValidationFailure,
};
pub use filter::{Filter, FilterBuilder, Matcher, MatcherSpec};
pub use header::{HEADER_KEY, Header, RESERVED_PREFIX};
pub use message::Message;
pub use message_class::{MessageClass, MessageClassBuilder};
pub use registry::{Handler, HandlerId, SubscriptionEntry, SubscriptionRegistry};
pub use schema::{Properties, PropertyDefault, PropertySpec, Schema, SchemaBuilder, Validator, ValueKind};
pub use serializer::{JsonSerializer, Serializer};
pub use transport::{LoopbackTransport, StdoutTransport, Transport};
