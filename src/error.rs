//! Error types for courier operations
//!
//! One enum per concern: schema declaration, message lifecycle, filter
//! normalization, publishing, transports, dispatch, and dedup storage.

use thiserror::Error;

/// A single property validation failure, accumulated by `Message::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Declared property name the failure belongs to.
    pub property: String,
    /// Human-readable reason the validator rejected the value.
    pub message: String,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// Errors raised while declaring a message schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("property name uses reserved prefix: {name}")]
    ReservedPropertyName { name: String },

    #[error("duplicate property declaration: {name}")]
    DuplicateProperty { name: String },

    #[error("alias {alias} collides with an existing property or alias")]
    DuplicateAlias { alias: String },

    #[error("schema version must be a positive integer, was {version}")]
    InvalidVersion { version: u32 },
}

/// Errors raised while constructing, validating, or decoding a message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("missing required property: {property}")]
    MissingRequiredProperty { property: String },

    #[error("validation failed for {} propert{}: {}",
        failures.len(),
        if failures.len() == 1 { "y" } else { "ies" },
        failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Validation { failures: Vec<ValidationFailure> },

    #[error("message cannot be published without a from address")]
    MissingFrom,

    #[error("header version must be a positive integer, was {version}")]
    InvalidVersion { version: u32 },

    #[error("version mismatch for {class}: expected {expected}, got {actual}")]
    VersionMismatch {
        class: String,
        expected: u32,
        actual: u32,
    },

    #[error("wire payload is missing the reserved header key")]
    MissingHeader,

    #[error("malformed header in wire payload: {source}")]
    MalformedHeader {
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while normalizing subscription filter criteria.
///
/// These surface at subscribe time, never at dispatch time.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter: {criterion} - {reason}")]
    InvalidFilter {
        criterion: &'static str,
        reason: String,
    },

    #[error("invalid filter pattern for {criterion}: {source}")]
    InvalidPattern {
        criterion: &'static str,
        #[source]
        source: Box<regex::Error>,
    },
}

/// Errors surfaced synchronously to the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no transport configured for {class}")]
    MissingTransport { class: String },

    #[error("no serializer available for transport {transport}")]
    MissingSerializer { transport: String },

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised by transports and serializers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serialization failed: {source}")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("deserialization failed: {source}")]
    Deserialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("transport {transport} unavailable: {reason}")]
    Unavailable { transport: String, reason: String },
}

/// Errors raised by the dispatcher intake and lifecycle operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shutting down and no longer accepts messages")]
    ShuttingDown,

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("shutdown timed out after {timeout_ms}ms with {in_flight} handlers in flight")]
    ShutdownTimeout { timeout_ms: u64, in_flight: usize },
}

/// Errors from deduplication storage backends.
///
/// Consumed internally: `contains` failures are fail-open, `add` failures are
/// logged and dropped.
#[derive(Debug, Error)]
pub enum DdqError {
    #[error("dedup storage command failed: {source}")]
    Storage {
        #[source]
        source: redis::RedisError,
    },

    #[error("dedup storage connection failed for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: redis::RedisError,
    },
}
