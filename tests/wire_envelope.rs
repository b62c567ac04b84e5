//! Wire envelope round trips and schema construction semantics

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::{Recorder, drain, loopback_pair};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

use courier::{
    Filter, JsonSerializer, Message, MessageClass, MessageError, PropertySpec, Schema, Serializer,
    Transport, Validator,
};

fn input(value: Value) -> Map<String, Value> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn construction_without_a_required_key_fails() {
    let schema = Arc::new(
        Schema::builder("Order")
            .property(PropertySpec::new("order_id").required())
            .build()
            .unwrap(),
    );
    let result = Message::build(schema, Map::new());
    assert!(matches!(
        result,
        Err(MessageError::MissingRequiredProperty { property }) if property == "order_id"
    ));
}

#[test]
fn transformer_applies_to_the_produced_default() {
    let schema = Arc::new(
        Schema::builder("Job")
            .property(
                PropertySpec::new("priority")
                    .default_with(|| json!("normal"))
                    .transform(|value| match value {
                        Value::String(s) => Value::String(s.to_uppercase()),
                        other => other,
                    }),
            )
            .build()
            .unwrap(),
    );
    let message = Message::build(schema, Map::new()).unwrap();
    assert_eq!(message.get("priority"), Some(&json!("NORMAL")));
}

#[test]
fn validate_collects_failures_and_is_valid_never_raises() {
    let schema = Arc::new(
        Schema::builder("Reading")
            .property(PropertySpec::new("celsius").validate(Validator::Range {
                min: Some(-90.0),
                max: Some(60.0),
            }))
            .property(
                PropertySpec::new("station").validate(Validator::predicate(|v| v.is_string())),
            )
            .build()
            .unwrap(),
    );
    let message = Message::build(
        schema,
        input(json!({ "celsius": 451, "station": 7 })),
    )
    .unwrap();

    assert!(!message.is_valid());
    match message.validate().unwrap_err() {
        MessageError::Validation { failures } => assert_eq!(failures.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn received_message_carries_the_published_uuid() {
    let (dispatcher, transport) = loopback_pair();
    let order = MessageClass::builder("Order")
        .from("order-svc")
        .property(PropertySpec::new("order_id").required())
        .transport(transport)
        .build()
        .unwrap();

    let recorder = Recorder::new();
    order.subscribe(Filter::empty(), recorder.handler()).unwrap();

    let mut message = order
        .new_message(input(json!({ "order_id": "ORD-001" })))
        .unwrap();
    order.publish(&mut message).await.unwrap();
    drain(&dispatcher).await;

    assert_eq!(recorder.uuids(), vec![message.uuid()]);
}

#[tokio::test]
async fn mismatched_version_on_receive_invokes_no_handler() {
    let (dispatcher, transport) = loopback_pair();
    let order = MessageClass::builder("Order")
        .version(2)
        .from("order-svc")
        .property(PropertySpec::new("order_id"))
        .transport(Arc::clone(&transport))
        .build()
        .unwrap();

    let recorder = Recorder::new();
    order.subscribe(Filter::empty(), recorder.handler()).unwrap();

    // A peer still on schema version 1.
    let stale = json!({
        "_sm_header": {
            "uuid": "6f2c1f5e-8f43-4a6f-9f2e-0d9be1c7a001",
            "message_class": "Order",
            "version": 1,
            "from": "legacy-svc",
        },
        "order_id": "ORD-OLD",
    });
    let payload = Bytes::from(serde_json::to_vec(&stale).unwrap());
    transport.receive(payload).await;

    drain(&dispatcher).await;
    assert_eq!(recorder.count(), 0);
    assert_eq!(dispatcher.status().scheduled, 0);
}

#[tokio::test]
async fn undecodable_inbound_payloads_are_skipped() {
    let (dispatcher, transport) = loopback_pair();
    let _order = MessageClass::builder("Order")
        .from("order-svc")
        .transport(Arc::clone(&transport))
        .build()
        .unwrap();

    transport.receive(Bytes::from_static(b"{{{ not json")).await;
    transport.receive(Bytes::from_static(b"[]")).await;
    assert_eq!(dispatcher.status().scheduled, 0);
}

proptest! {
    // decode(encode(envelope)) is the identity, and the header UUID is
    // stable across encode, decode, and reconstruction.
    #[test]
    fn wire_round_trip_preserves_envelope_and_uuid(
        order_id in "[A-Za-z0-9-]{1,24}",
        amount in 0.0f64..1e9,
        note in ".*",
    ) {
        let schema = Arc::new(
            Schema::builder("Order")
                .property(PropertySpec::new("order_id").required())
                .property(PropertySpec::new("amount"))
                .property(PropertySpec::new("note"))
                .build()
                .unwrap(),
        );
        let mut message = Message::build(
            Arc::clone(&schema),
            input(json!({ "order_id": order_id, "amount": amount, "note": note })),
        )
        .unwrap();
        message.set_from("order-svc");

        let envelope = message.to_wire();
        let serializer = JsonSerializer::new();
        let decoded = serializer.decode(&serializer.encode(&envelope).unwrap()).unwrap();
        prop_assert_eq!(&decoded, &envelope);

        let rebuilt = Message::from_wire(schema, decoded).unwrap();
        prop_assert_eq!(rebuilt.uuid(), message.uuid());
        prop_assert_eq!(rebuilt.to_wire(), envelope);
    }
}
