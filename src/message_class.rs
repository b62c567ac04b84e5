//! Message classes: schema plus class-level configuration
//!
//! A message class binds an immutable schema to its addressing defaults,
//! transports, serializer fallback, and dedup policy. Instances are created
//! through the class so defaults apply; `publish` drives the full
//! validate, stamp, encode, transport fan-out path.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::ddq::{DdqStorage, DedupPolicy};
use crate::domain::DdqCapacity;
use crate::error::{MessageError, PublishError, SchemaError};
use crate::filter::Filter;
use crate::message::Message;
use crate::registry::{Handler, HandlerId};
use crate::schema::{PropertySpec, Schema, SchemaBuilder};
use crate::serializer::Serializer;
use crate::transport::Transport;

struct ClassInner {
    schema: Arc<Schema>,
    from: Option<String>,
    to: Option<String>,
    reply_to: Option<String>,
    transports: Vec<Arc<dyn Transport>>,
    serializer: Option<Arc<dyn Serializer>>,
    dedup: Arc<DedupPolicy>,
}

/// A registered message class. Cheap to clone; all clones share the same
/// configuration, and the dedup enable flag is the only runtime-mutable
/// piece.
#[derive(Clone)]
pub struct MessageClass {
    inner: Arc<ClassInner>,
}

impl std::fmt::Debug for MessageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageClass")
            .field("name", &self.inner.schema.name())
            .field("version", &self.inner.schema.version())
            .field("transports", &self.inner.transports.len())
            .finish_non_exhaustive()
    }
}

impl MessageClass {
    /// Starts building a class with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MessageClassBuilder {
        MessageClassBuilder {
            schema: Schema::builder(name),
            from: None,
            to: None,
            reply_to: None,
            transports: Vec::new(),
            serializer: None,
            ddq_size: DdqCapacity::default(),
            ddq_storage: DdqStorage::Memory,
            dedup_enabled: false,
        }
    }

    /// The fully qualified class name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.schema.name()
    }

    /// The declared schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.schema.version()
    }

    /// Class-level description.
    #[must_use]
    pub fn description(&self) -> String {
        self.inner.schema.description()
    }

    /// The shared schema descriptor.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Declared property names.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.inner.schema.fields()
    }

    /// Property description table for introspection.
    #[must_use]
    pub fn property_descriptions(&self) -> std::collections::HashMap<&str, &str> {
        self.inner.schema.property_descriptions()
    }

    /// Builds an instance, applying the class addressing defaults.
    ///
    /// # Errors
    ///
    /// `MissingRequiredProperty` when a required property has no value after
    /// alias and default resolution.
    pub fn new_message(&self, input: Map<String, Value>) -> Result<Message, MessageError> {
        let mut message = Message::build(Arc::clone(&self.inner.schema), input)?;
        if let Some(from) = &self.inner.from {
            message.set_from(from.clone());
        }
        if self.inner.to.is_some() {
            message.set_to(self.inner.to.clone());
        }
        if self.inner.reply_to.is_some() {
            message.set_reply_to(self.inner.reply_to.clone());
        }
        Ok(message)
    }

    /// Registers an inline handler with a filter, returning the synthetic
    /// handler id.
    ///
    /// # Errors
    ///
    /// `MissingTransport` when the class has no transport to forward the
    /// subscription to.
    pub fn subscribe(&self, filter: Filter, handler: Handler) -> Result<HandlerId, PublishError> {
        let handler_id = HandlerId::inline(self.name());
        self.subscribe_as(handler_id.clone(), filter, handler)?;
        Ok(handler_id)
    }

    /// Registers a handler under a caller-chosen id, conventionally
    /// `"Class.method"`.
    ///
    /// # Errors
    ///
    /// `MissingTransport` when the class has no transport.
    pub fn subscribe_as(
        &self,
        handler_id: HandlerId,
        filter: Filter,
        handler: Handler,
    ) -> Result<(), PublishError> {
        if self.inner.transports.is_empty() {
            return Err(PublishError::MissingTransport {
                class: self.name().to_string(),
            });
        }

        for transport in &self.inner.transports {
            if let Some(dispatcher) = transport.dispatcher() {
                dispatcher.register_handler(handler_id.clone(), handler.clone());
            }
            transport.subscribe(self.name(), handler_id.clone(), filter.clone());
        }
        Ok(())
    }

    /// Removes one subscription across all transports.
    pub fn unsubscribe(&self, handler_id: &HandlerId) {
        for transport in &self.inner.transports {
            transport.unsubscribe(self.name(), handler_id);
        }
    }

    /// Removes every subscription for this class across all transports.
    pub fn unsubscribe_all(&self) {
        for transport in &self.inner.transports {
            transport.unsubscribe_all(self.name());
        }
    }

    /// Turns deduplication on for this class.
    pub fn enable_deduplication(&self) {
        self.inner.dedup.enable();
    }

    /// Turns deduplication off, returning to always-deliver behavior.
    pub fn disable_deduplication(&self) {
        self.inner.dedup.disable();
    }

    /// Whether deduplication is currently enabled.
    #[must_use]
    pub fn deduplication_enabled(&self) -> bool {
        self.inner.dedup.is_enabled()
    }

    /// Publishes an instance: validate, stamp the header, encode with each
    /// transport's serializer, and fan out best-effort. Per-transport
    /// failures are logged; the call errs only when validation fails, a
    /// transport lacks a serializer, or every transport fails.
    ///
    /// # Errors
    ///
    /// `Message` for header or property validation failures,
    /// `MissingTransport` / `MissingSerializer` for configuration gaps,
    /// `Transport` when no transport accepted the envelope.
    pub async fn publish(&self, message: &mut Message) -> Result<(), PublishError> {
        message.header().validate()?;
        message.validate()?;

        if self.inner.transports.is_empty() {
            return Err(PublishError::MissingTransport {
                class: self.name().to_string(),
            });
        }

        let mut delivered = 0usize;
        let mut last_err: Option<PublishError> = None;

        for transport in &self.inner.transports {
            let serializer = transport
                .serializer()
                .or_else(|| self.inner.serializer.clone());
            let Some(serializer) = serializer else {
                return Err(PublishError::MissingSerializer {
                    transport: transport.name().to_string(),
                });
            };

            message.header_mut().stamp_for_publish(serializer.name());
            let envelope = message.to_wire();

            let payload = match serializer.encode(&envelope) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(
                        class = %self.name(),
                        transport = transport.name(),
                        error = %err,
                        "envelope encoding failed"
                    );
                    last_err = Some(err.into());
                    continue;
                }
            };

            match transport.publish(message.header(), payload).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    error!(
                        class = %self.name(),
                        transport = transport.name(),
                        error = %err,
                        "transport publish failed"
                    );
                    last_err = Some(err.into());
                }
            }
        }

        match (delivered, last_err) {
            (0, Some(err)) => Err(err),
            (0, None) => unreachable!("no transports is checked above"),
            _ => Ok(()),
        }
    }
}

/// Builder assembling a [`MessageClass`]: the schema declaration plus the
/// class-level configuration surface.
pub struct MessageClassBuilder {
    schema: SchemaBuilder,
    from: Option<String>,
    to: Option<String>,
    reply_to: Option<String>,
    transports: Vec<Arc<dyn Transport>>,
    serializer: Option<Arc<dyn Serializer>>,
    ddq_size: DdqCapacity,
    ddq_storage: DdqStorage,
    dedup_enabled: bool,
}

impl MessageClassBuilder {
    /// Declares the schema version (default 1).
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.schema = self.schema.version(version);
        self
    }

    /// Sets the class-level description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.schema = self.schema.description(description);
        self
    }

    /// Adds a property declaration.
    #[must_use]
    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.schema = self.schema.property(spec);
        self
    }

    /// Construction policy for undeclared input keys (default: ignore).
    #[must_use]
    pub fn ignore_undeclared(mut self, ignore: bool) -> Self {
        self.schema = self.schema.ignore_undeclared(ignore);
        self
    }

    /// Default sender identity stamped into new instances.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Default recipient for new instances.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Default reply address for new instances.
    #[must_use]
    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Binds a transport. Call repeatedly for multi-transport fan-out.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Serializer fallback for transports that declare none.
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Deduplication window length (default 100).
    #[must_use]
    pub fn ddq_size(mut self, size: DdqCapacity) -> Self {
        self.ddq_size = size;
        self
    }

    /// Deduplication storage backend (default in-memory).
    #[must_use]
    pub fn ddq_storage(mut self, storage: DdqStorage) -> Self {
        self.ddq_storage = storage;
        self
    }

    /// Enables deduplication from the start.
    #[must_use]
    pub fn enable_deduplication(mut self) -> Self {
        self.dedup_enabled = true;
        self
    }

    /// Finalizes the class and registers it with every bound transport's
    /// dispatcher so the receive path can decode its envelopes.
    ///
    /// # Errors
    ///
    /// Schema declaration errors: zero version, reserved property names,
    /// duplicate names or aliases.
    pub fn build(self) -> Result<MessageClass, SchemaError> {
        let schema = Arc::new(self.schema.build()?);
        let dedup = Arc::new(DedupPolicy::new(
            self.dedup_enabled,
            self.ddq_size,
            self.ddq_storage,
        ));

        if self.transports.is_empty() {
            warn!(class = schema.name(), "message class built without transports");
        }
        for transport in &self.transports {
            if let Some(dispatcher) = transport.dispatcher() {
                dispatcher.register_class(Arc::clone(&schema), Arc::clone(&dedup));
            }
        }

        Ok(MessageClass {
            inner: Arc::new(ClassInner {
                schema,
                from: self.from,
                to: self.to,
                reply_to: self.reply_to,
                transports: self.transports,
                serializer: self.serializer,
                dedup,
            }),
        })
    }
}
