//! Message instances: a header plus canonical property values
//!
//! Instances are created through a [`crate::message_class::MessageClass`] so
//! the class schema and addressing defaults apply; this module owns the
//! instance behavior and the wire-envelope round trip.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::MessageError;
use crate::header::{HEADER_KEY, Header};
use crate::schema::{Properties, Schema};

/// One typed, self-describing message instance.
#[derive(Debug, Clone)]
pub struct Message {
    header: Header,
    schema: Arc<Schema>,
    properties: Properties,
}

impl Message {
    /// Builds an instance from loosely keyed input, stamping the class name
    /// and version into a fresh header.
    ///
    /// # Errors
    ///
    /// `MissingRequiredProperty` when a required property has no value after
    /// alias and default resolution.
    pub fn build(schema: Arc<Schema>, input: Map<String, Value>) -> Result<Self, MessageError> {
        let header = Header::new(schema.name(), schema.version());
        let properties = schema.build_properties(input)?;
        Ok(Self {
            header,
            schema,
            properties,
        })
    }

    /// The message header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// The schema shared by all instances of this class.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The canonical property values.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Shorthand for the header UUID as a string.
    #[must_use]
    pub fn uuid(&self) -> String {
        self.header.uuid.to_string()
    }

    /// The message class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.header.message_class
    }

    /// Looks up a property by canonical name or alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let canonical = self.schema.property(name)?.name();
        self.properties.get(canonical)
    }

    /// Assigns one property, resolving aliases and applying the declared
    /// transformer. Undeclared names are ignored per construction policy.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if let Some((canonical, stored)) = self.schema.assign(name, value.into()) {
            self.properties.insert(canonical, stored);
        } else {
            tracing::debug!(class = %self.class_name(), name, "ignoring undeclared property");
        }
    }

    /// Overrides the sender identity before publish.
    pub fn set_from(&mut self, from: impl Into<String>) {
        self.header.from = Some(from.into());
    }

    /// Overrides the recipient; `None` makes the message a broadcast.
    pub fn set_to(&mut self, to: Option<String>) {
        self.header.to = to;
    }

    /// Overrides the reply address.
    pub fn set_reply_to(&mut self, reply_to: Option<String>) {
        self.header.reply_to = reply_to;
    }

    /// Runs every declared validator, erring with the accumulated failures.
    ///
    /// # Errors
    ///
    /// `Validation` carrying every failing property.
    pub fn validate(&self) -> Result<(), MessageError> {
        self.schema.validate(&self.properties)
    }

    /// The total boolean variant of [`Message::validate`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.schema.is_valid(&self.properties)
    }

    /// Encodes the wire envelope: a flat map of the declared properties with
    /// the header embedded under the reserved key.
    #[must_use]
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut envelope = self.properties.as_map().clone();
        let header = serde_json::to_value(&self.header)
            .expect("header serialization is infallible");
        envelope.insert(HEADER_KEY.to_string(), header);
        envelope
    }

    /// Reconstructs an instance from a decoded wire envelope.
    ///
    /// The embedded header survives verbatim (the UUID is stable across the
    /// round trip); the remaining keys run through schema construction. The
    /// header version must match the schema; the check is fail-closed.
    ///
    /// # Errors
    ///
    /// `MissingHeader` / `MalformedHeader` for a damaged envelope,
    /// `VersionMismatch` when the header disagrees with the schema version.
    pub fn from_wire(
        schema: Arc<Schema>,
        mut envelope: Map<String, Value>,
    ) -> Result<Self, MessageError> {
        let raw_header = envelope
            .remove(HEADER_KEY)
            .ok_or(MessageError::MissingHeader)?;
        let header: Header = serde_json::from_value(raw_header)
            .map_err(|source| MessageError::MalformedHeader { source })?;

        if header.version != schema.version() {
            return Err(MessageError::VersionMismatch {
                class: schema.name().to_string(),
                expected: schema.version(),
                actual: header.version,
            });
        }

        let properties = schema.build_properties(envelope)?;
        Ok(Self {
            header,
            schema,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertySpec;
    use serde_json::json;

    fn alert_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("Alert")
                .version(2)
                .property(PropertySpec::new("severity").required())
                .property(PropertySpec::new("message").default_value(""))
                .build()
                .unwrap(),
        )
    }

    fn input(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn build_stamps_class_and_version() {
        let message =
            Message::build(alert_schema(), input(json!({ "severity": "warn" }))).unwrap();
        assert_eq!(message.class_name(), "Alert");
        assert_eq!(message.header().version, 2);
        assert_eq!(message.get("severity"), Some(&json!("warn")));
    }

    #[test]
    fn wire_envelope_round_trips_with_stable_uuid() {
        let schema = alert_schema();
        let mut message =
            Message::build(Arc::clone(&schema), input(json!({ "severity": "err" }))).unwrap();
        message.set_from("mon");
        message.header_mut().stamp_for_publish("JSON");

        let envelope = message.to_wire();
        assert!(envelope.contains_key(HEADER_KEY));
        assert_eq!(envelope.get("severity"), Some(&json!("err")));

        let decoded = Message::from_wire(schema, envelope.clone()).unwrap();
        assert_eq!(decoded.header(), message.header());
        assert_eq!(decoded.uuid(), message.uuid());
        assert_eq!(decoded.to_wire(), envelope);
    }

    #[test]
    fn from_wire_rejects_version_mismatch() {
        let schema = alert_schema();
        let mut message =
            Message::build(Arc::clone(&schema), input(json!({ "severity": "err" }))).unwrap();
        message.header_mut().version = 1;

        let result = Message::from_wire(schema, message.to_wire());
        assert!(matches!(
            result,
            Err(MessageError::VersionMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn from_wire_requires_the_header_key() {
        let result = Message::from_wire(alert_schema(), input(json!({ "severity": "x" })));
        assert!(matches!(result, Err(MessageError::MissingHeader)));
    }

    #[test]
    fn set_resolves_alias_and_ignores_undeclared() {
        let schema = Arc::new(
            Schema::builder("Aliased")
                .property(PropertySpec::new("order_id").alias("orderId"))
                .build()
                .unwrap(),
        );
        let mut message = Message::build(schema, Map::new()).unwrap();

        message.set("orderId", "ORD-9");
        assert_eq!(message.get("order_id"), Some(&json!("ORD-9")));
        assert_eq!(message.get("orderId"), Some(&json!("ORD-9")));

        message.set("bogus", 1);
        assert!(message.get("bogus").is_none());
    }
}
