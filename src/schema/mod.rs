//! Declarative message schemas
//!
//! A schema is the immutable per-class descriptor produced by
//! [`SchemaBuilder`]: the declared properties (default, required, validator,
//! transformer, aliases, description), the class version, and the class
//! description. All instances of a message class share one schema.

mod properties;
mod validator;

pub use properties::Properties;
pub use validator::{Validator, ValueKind};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{MessageError, SchemaError, ValidationFailure};
use crate::header::RESERVED_PREFIX;

type Transformer = Arc<dyn Fn(Value) -> Value + Send + Sync>;
type DefaultProducer = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default value source for a declared property.
#[derive(Clone)]
pub enum PropertyDefault {
    /// A literal value cloned into each instance.
    Literal(Value),
    /// A zero-arg producer invoked lazily when the key is absent.
    Producer(DefaultProducer),
}

impl PropertyDefault {
    fn materialize(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for PropertyDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "Literal({value})"),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Declaration of a single typed property.
///
/// Built fluently and handed to [`SchemaBuilder::property`]:
///
/// ```
/// use courier::schema::{PropertySpec, Validator};
///
/// let spec = PropertySpec::new("severity")
///     .required()
///     .validate(Validator::OneOf(vec!["warn".into(), "err".into()]))
///     .description("alert severity level");
/// ```
#[derive(Clone)]
pub struct PropertySpec {
    name: String,
    default: Option<PropertyDefault>,
    required: bool,
    validator: Option<Validator>,
    transform: Option<Transformer>,
    aliases: Vec<String>,
    description: Option<String>,
}

impl PropertySpec {
    /// Starts a declaration for the named property.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            required: false,
            validator: None,
            transform: None,
            aliases: Vec::new(),
            description: None,
        }
    }

    /// Marks the property as required after alias and default resolution.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declares a literal default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(PropertyDefault::Literal(value.into()));
        self
    }

    /// Declares a lazily invoked default producer.
    #[must_use]
    pub fn default_with(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(PropertyDefault::Producer(Arc::new(f)));
        self
    }

    /// Attaches a validator, evaluated only on explicit validation.
    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Attaches a transformer applied on assignment; its output replaces the
    /// raw value.
    #[must_use]
    pub fn transform(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Accepts an external name for this property at construction.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Human-readable description used for introspection.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The canonical property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("validator", &self.validator)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// Immutable per-class schema descriptor.
#[derive(Debug)]
pub struct Schema {
    name: String,
    version: u32,
    description: Option<String>,
    properties: Vec<PropertySpec>,
    // external or canonical name -> index into `properties`
    lookup: HashMap<String, usize>,
    ignore_undeclared: bool,
}

impl Schema {
    /// Starts building a schema for the named message class.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            version: 1,
            description: None,
            properties: Vec::new(),
            ignore_undeclared: true,
        }
    }

    /// The fully qualified message class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Class-level description, with a generated fallback.
    #[must_use]
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} is a courier message", self.name))
    }

    /// Declared property names, reserved-prefixed names excluded.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.properties
            .iter()
            .map(|p| p.name.as_str())
            .filter(|name| !name.starts_with(RESERVED_PREFIX))
            .collect()
    }

    /// Property descriptions for introspection; undescribed properties are
    /// omitted.
    #[must_use]
    pub fn property_descriptions(&self) -> HashMap<&str, &str> {
        self.properties
            .iter()
            .filter_map(|p| {
                p.description
                    .as_deref()
                    .map(|desc| (p.name.as_str(), desc))
            })
            .collect()
    }

    pub(crate) fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.lookup.get(name).map(|&idx| &self.properties[idx])
    }

    /// Builds the canonical property map from loosely keyed input.
    ///
    /// Per-property order of operations: alias resolution, default
    /// (lazily produced), required check, transform, store. Validators do
    /// not run here. Undeclared input keys are ignored when the schema's
    /// construction policy says so (the default).
    ///
    /// # Errors
    ///
    /// `MissingRequiredProperty` for each required property that has no
    /// value after alias and default resolution (first one reported).
    pub fn build_properties(
        &self,
        mut input: Map<String, Value>,
    ) -> Result<Properties, MessageError> {
        let mut out = Properties::new();

        for spec in &self.properties {
            // Canonical name wins; aliases are consulted in declaration order.
            let mut value = input.remove(&spec.name);
            if value.is_none() {
                for alias in &spec.aliases {
                    if let Some(v) = input.remove(alias) {
                        value = Some(v);
                        break;
                    }
                }
            }

            let mut value = match value {
                Some(v) => Some(v),
                None => spec.default.as_ref().map(PropertyDefault::materialize),
            };

            if value.is_none() && spec.required {
                return Err(MessageError::MissingRequiredProperty {
                    property: spec.name.clone(),
                });
            }

            if let Some(raw) = value.take() {
                let stored = match &spec.transform {
                    Some(transform) => transform(raw),
                    None => raw,
                };
                out.insert(spec.name.clone(), stored);
            }
        }

        if !self.ignore_undeclared && !input.is_empty() {
            let keys: Vec<_> = input.keys().cloned().collect();
            tracing::debug!(class = %self.name, ?keys, "dropping undeclared keys");
        }

        Ok(out)
    }

    /// Resolves an input name (canonical or alias) and applies the
    /// property's transformer. Used for single-property assignment.
    pub(crate) fn assign(
        &self,
        name: &str,
        value: Value,
    ) -> Option<(String, Value)> {
        let spec = self.property(name)?;
        let stored = match &spec.transform {
            Some(transform) => transform(value),
            None => value,
        };
        Some((spec.name.clone(), stored))
    }

    /// Runs every declared validator, accumulating all failures.
    #[must_use]
    pub fn check(&self, properties: &Properties) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();
        for spec in &self.properties {
            let Some(validator) = &spec.validator else {
                continue;
            };
            let Some(value) = properties.get(&spec.name) else {
                // Absent optional values are not a validator concern.
                continue;
            };
            if let Some(failure) = validator.check(&spec.name, value, properties) {
                failures.push(failure);
            }
        }
        failures
    }

    /// The eager variant: errs with the accumulated failure list.
    ///
    /// # Errors
    ///
    /// `Validation` carrying every failing property.
    pub fn validate(&self, properties: &Properties) -> Result<(), MessageError> {
        let failures = self.check(properties);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MessageError::Validation { failures })
        }
    }

    /// The total boolean variant.
    #[must_use]
    pub fn is_valid(&self, properties: &Properties) -> bool {
        self.check(properties).is_empty()
    }
}

/// Builder producing an immutable [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    version: u32,
    description: Option<String>,
    properties: Vec<PropertySpec>,
    ignore_undeclared: bool,
}

impl SchemaBuilder {
    /// Declares the schema version (positive integer, default 1).
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the class-level description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a property declaration.
    #[must_use]
    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Construction policy for input keys that match no declaration.
    #[must_use]
    pub fn ignore_undeclared(mut self, ignore: bool) -> Self {
        self.ignore_undeclared = ignore;
        self
    }

    /// Finalizes the schema.
    ///
    /// # Errors
    ///
    /// Rejects a zero version, reserved-prefixed property names, and
    /// duplicate names or aliases.
    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.version == 0 {
            return Err(SchemaError::InvalidVersion { version: 0 });
        }

        let mut lookup = HashMap::new();
        for (idx, spec) in self.properties.iter().enumerate() {
            if spec.name.starts_with(RESERVED_PREFIX) {
                return Err(SchemaError::ReservedPropertyName {
                    name: spec.name.clone(),
                });
            }
            if lookup.insert(spec.name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    name: spec.name.clone(),
                });
            }
            for alias in &spec.aliases {
                if lookup.insert(alias.clone(), idx).is_some() {
                    return Err(SchemaError::DuplicateAlias {
                        alias: alias.clone(),
                    });
                }
            }
        }

        Ok(Schema {
            name: self.name,
            version: self.version,
            description: self.description,
            properties: self.properties,
            lookup,
            ignore_undeclared: self.ignore_undeclared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_schema() -> Schema {
        Schema::builder("OrderMessage")
            .version(2)
            .description("order lifecycle events")
            .property(
                PropertySpec::new("order_id")
                    .required()
                    .alias("orderId")
                    .description("external order identifier"),
            )
            .property(
                PropertySpec::new("amount")
                    .validate(Validator::Range {
                        min: Some(0.0),
                        max: None,
                    })
                    .description("order total"),
            )
            .property(PropertySpec::new("currency").default_value("USD"))
            .property(
                PropertySpec::new("note")
                    .default_with(|| json!("n/a"))
                    .transform(|v| match v {
                        Value::String(s) => Value::String(s.to_uppercase()),
                        other => other,
                    }),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn construction_resolves_aliases_and_defaults() {
        let schema = order_schema();
        let input = serde_json::from_value(json!({
            "orderId": "ORD-001",
            "amount": 99.99,
        }))
        .unwrap();

        let props = schema.build_properties(input).unwrap();
        assert_eq!(props.get("order_id"), Some(&json!("ORD-001")));
        assert_eq!(props.get("currency"), Some(&json!("USD")));
        // Producer default is transformed like any assigned value.
        assert_eq!(props.get("note"), Some(&json!("N/A")));
    }

    #[test]
    fn missing_required_property_fails_construction() {
        let schema = order_schema();
        let input = serde_json::from_value(json!({ "amount": 10 })).unwrap();
        assert!(matches!(
            schema.build_properties(input),
            Err(MessageError::MissingRequiredProperty { property }) if property == "order_id"
        ));
    }

    #[test]
    fn undeclared_keys_are_ignored() {
        let schema = order_schema();
        let input = serde_json::from_value(json!({
            "order_id": "ORD-001",
            "shoe_size": 44,
        }))
        .unwrap();
        let props = schema.build_properties(input).unwrap();
        assert!(!props.contains("shoe_size"));
    }

    #[test]
    fn canonical_name_wins_over_alias() {
        let schema = order_schema();
        let input = serde_json::from_value(json!({
            "order_id": "ORD-CANON",
            "orderId": "ORD-ALIAS",
        }))
        .unwrap();
        let props = schema.build_properties(input).unwrap();
        assert_eq!(props.get("order_id"), Some(&json!("ORD-CANON")));
    }

    #[test]
    fn validators_do_not_run_at_construction() {
        let schema = order_schema();
        let input = serde_json::from_value(json!({
            "order_id": "ORD-001",
            "amount": -5,
        }))
        .unwrap();

        let props = schema.build_properties(input).unwrap();
        assert!(!schema.is_valid(&props));

        let err = schema.validate(&props).unwrap_err();
        match err {
            MessageError::Validation { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].property, "amount");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_accumulates_every_failure() {
        let schema = Schema::builder("Multi")
            .property(
                PropertySpec::new("a").validate(Validator::Kind(ValueKind::String)),
            )
            .property(
                PropertySpec::new("b").validate(Validator::Kind(ValueKind::Number)),
            )
            .build()
            .unwrap();

        let input = serde_json::from_value(json!({ "a": 1, "b": "x" })).unwrap();
        let props = schema.build_properties(input).unwrap();
        let failures = schema.check(&props);
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn reserved_prefix_is_rejected_at_declaration() {
        let result = Schema::builder("Bad")
            .property(PropertySpec::new("_sm_payload"))
            .build();
        assert!(matches!(
            result,
            Err(SchemaError::ReservedPropertyName { .. })
        ));
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let result = Schema::builder("Bad")
            .property(PropertySpec::new("x"))
            .property(PropertySpec::new("x"))
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateProperty { .. })));

        let result = Schema::builder("Bad")
            .property(PropertySpec::new("x"))
            .property(PropertySpec::new("y").alias("x"))
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateAlias { .. })));
    }

    #[test]
    fn introspection_surface() {
        let schema = order_schema();
        assert_eq!(
            schema.fields(),
            vec!["order_id", "amount", "currency", "note"]
        );
        assert_eq!(schema.description(), "order lifecycle events");
        let descriptions = schema.property_descriptions();
        assert_eq!(
            descriptions.get("order_id"),
            Some(&"external order identifier")
        );
        assert!(!descriptions.contains_key("currency"));

        let bare = Schema::builder("Bare").build().unwrap();
        assert_eq!(bare.description(), "Bare is a courier message");
    }
}
