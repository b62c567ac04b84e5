//! Transport contract plus the in-process implementations
//!
//! A transport delivers encoded envelopes to peers and hands inbound
//! payloads to the dispatcher. The core never chooses the serializer; the
//! transport declares it. Loopback delivers to local subscribers through a
//! full encode/decode round trip; stdout is write-only.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::filter::Filter;
use crate::header::{HEADER_KEY, Header};
use crate::message::Message;
use crate::registry::HandlerId;
use crate::serializer::{JsonSerializer, Serializer};

/// Pluggable delivery substrate.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name used in logs and errors.
    fn name(&self) -> &str;

    /// The serializer the core should use to encode on publish and decode on
    /// receive. `None` defers to the message class binding.
    fn serializer(&self) -> Option<Arc<dyn Serializer>>;

    /// The dispatcher inbound messages are routed to. Write-only transports
    /// return `None`.
    fn dispatcher(&self) -> Option<Dispatcher> {
        None
    }

    /// Delivers an encoded envelope to peers. Must not block the caller
    /// beyond its own send semantics.
    ///
    /// # Errors
    ///
    /// Transport-specific synchronous failures, surfaced to the publisher.
    async fn publish(&self, header: &Header, payload: Bytes) -> Result<(), TransportError>;

    /// Entry point for payloads arriving from a peer. Decode failures,
    /// unknown classes, and version mismatches are logged and the payload is
    /// skipped; nothing propagates back to the peer.
    async fn receive(&self, payload: Bytes) {
        let Some(dispatcher) = self.dispatcher() else {
            warn!(transport = self.name(), "transport has no dispatcher, inbound payload dropped");
            return;
        };
        let Some(serializer) = self.serializer() else {
            warn!(transport = self.name(), "transport has no serializer, inbound payload dropped");
            return;
        };

        let envelope = match serializer.decode(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(transport = self.name(), error = %err, "failed to decode inbound payload, skipping");
                return;
            }
        };

        let class_name = envelope
            .get(HEADER_KEY)
            .and_then(|header| header.get("message_class"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let Some(class_name) = class_name else {
            error!(transport = self.name(), "inbound payload has no message class, skipping");
            return;
        };

        let Some(schema) = dispatcher.schema_for(&class_name) else {
            debug!(
                transport = self.name(),
                class = %class_name,
                "no registered class for inbound payload, skipping"
            );
            return;
        };

        match Message::from_wire(schema, envelope) {
            Ok(message) => {
                if let Err(err) = dispatcher.route(message).await {
                    error!(
                        transport = self.name(),
                        class = %class_name,
                        error = %err,
                        "inbound message rejected"
                    );
                }
            }
            Err(err) => {
                error!(
                    transport = self.name(),
                    class = %class_name,
                    error = %err,
                    "failed to reconstruct inbound message, skipping"
                );
            }
        }
    }

    /// Forwards a subscription to the dispatcher.
    fn subscribe(&self, class_name: &str, handler_id: HandlerId, filter: Filter) {
        match self.dispatcher() {
            Some(dispatcher) => dispatcher.add(class_name, handler_id, filter),
            None => warn!(
                transport = self.name(),
                class = class_name,
                "transport cannot deliver inbound messages, subscription ignored"
            ),
        }
    }

    /// Forwards an unsubscribe to the dispatcher.
    fn unsubscribe(&self, class_name: &str, handler_id: &HandlerId) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.remove(class_name, handler_id);
        }
    }

    /// Forwards a class-wide unsubscribe to the dispatcher.
    fn unsubscribe_all(&self, class_name: &str) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.remove_all(class_name);
        }
    }

    /// Lifecycle predicate; in-process transports are always connected.
    fn connected(&self) -> bool {
        true
    }

    /// Establishes the connection. No-op by default.
    ///
    /// # Errors
    ///
    /// Transport-specific connection failures.
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Tears the connection down. No-op by default.
    ///
    /// # Errors
    ///
    /// Transport-specific disconnection failures.
    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// In-process transport: published envelopes are immediately received and
/// routed to local subscribers, passing through the serializer both ways so
/// the wire round trip is exercised.
pub struct LoopbackTransport {
    dispatcher: Dispatcher,
    serializer: Arc<dyn Serializer>,
}

impl LoopbackTransport {
    /// Creates a loopback over the dispatcher with the JSON serializer.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::with_serializer(dispatcher, Arc::new(JsonSerializer::new()))
    }

    /// Creates a loopback with a specific serializer.
    #[must_use]
    pub fn with_serializer(dispatcher: Dispatcher, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            dispatcher,
            serializer,
        }
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        "loopback"
    }

    fn serializer(&self) -> Option<Arc<dyn Serializer>> {
        Some(Arc::clone(&self.serializer))
    }

    fn dispatcher(&self) -> Option<Dispatcher> {
        Some(self.dispatcher.clone())
    }

    async fn publish(&self, _header: &Header, payload: Bytes) -> Result<(), TransportError> {
        self.receive(payload).await;
        Ok(())
    }
}

/// Write-only transport printing one encoded envelope per line. Useful for
/// demos and exercising the publish path without a subscriber side.
pub struct StdoutTransport {
    serializer: Arc<dyn Serializer>,
}

impl StdoutTransport {
    /// Creates the transport with the JSON serializer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            serializer: Arc::new(JsonSerializer::new()),
        }
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StdoutTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for StdoutTransport {
    fn name(&self) -> &str {
        "stdout"
    }

    fn serializer(&self) -> Option<Arc<dyn Serializer>> {
        Some(Arc::clone(&self.serializer))
    }

    async fn publish(&self, _header: &Header, payload: Bytes) -> Result<(), TransportError> {
        let mut out = std::io::stdout().lock();
        out.write_all(&payload)
            .and_then(|()| out.write_all(b"\n"))
            .map_err(|err| TransportError::Unavailable {
                transport: "stdout".to_string(),
                reason: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatcherConfig;
    use crate::schema::Schema;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loopback_routes_published_payloads() {
        let dispatcher = Dispatcher::new(DispatcherConfig::development());
        let schema = Arc::new(Schema::builder("Ping").build().unwrap());
        dispatcher.register_class(Arc::clone(&schema), Arc::default());

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        dispatcher.subscribe(
            "Ping",
            Filter::empty(),
            crate::registry::Handler::unified(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let transport = LoopbackTransport::new(dispatcher.clone());
        let mut message = Message::build(schema, serde_json::Map::new()).unwrap();
        message.set_from("tester");
        message.header_mut().stamp_for_publish("JSON");

        let payload = JsonSerializer::new().encode(&message.to_wire()).unwrap();
        transport.publish(message.header(), payload).await.unwrap();

        dispatcher
            .shutdown(std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loopback_skips_undecodable_payloads() {
        let dispatcher = Dispatcher::new(DispatcherConfig::development());
        let transport = LoopbackTransport::new(dispatcher.clone());
        let header = Header::new("Ping", 1);

        // Must not error or panic; the payload is logged and dropped.
        transport
            .publish(&header, Bytes::from_static(b"not json"))
            .await
            .unwrap();
        assert_eq!(dispatcher.status().scheduled, 0);
    }

    #[test]
    fn stdout_transport_has_no_dispatcher() {
        let transport = StdoutTransport::new();
        assert!(transport.dispatcher().is_none());
        assert!(transport.connected());
        // Subscription is ignored rather than panicking.
        transport.subscribe("Ping", HandlerId::named("X.y"), Filter::empty());
    }
}
