use serde_json::{json, Value};

use tillsync::{
    dispatch::{resolve, DispatchError, Endpoint, FailureClass},
    envelope::{generate_id, Envelope, Payload},
    types::OpKind,
};

fn obj(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[test]
fn sale_goes_to_transactions_without_metadata() {
    let env = Envelope::with_id(
        "e1",
        OpKind::Sale,
        obj(json!({
            "paymentMethod": "balance",
            "customerId": 12,
            "items": [{"productId": 4, "quantity": 1}],
            "id": "spoofed",
            "createdAt": 5,
        })),
        99,
    );

    let req = resolve(&env).expect("resolve");
    assert_eq!(req.endpoint, Endpoint::Transactions);
    assert_eq!(req.endpoint.path(), "/transactions");
    assert_eq!(
        req.body,
        json!({
            "paymentMethod": "balance",
            "customerId": 12,
            "items": [{"productId": 4, "quantity": 1}],
        })
    );
}

#[test]
fn topup_goes_to_customer_endpoint_with_only_topup_fields() {
    let env = Envelope::with_id(
        "t1",
        OpKind::Topup,
        obj(json!({"customerId": "abc", "amount": 10.5, "method": "cash", "reference": "bar", "note": "x"})),
        1,
    );

    let req = resolve(&env).expect("resolve");
    assert_eq!(
        req.endpoint,
        Endpoint::CustomerTopup {
            customer_id: "abc".to_string()
        }
    );
    assert_eq!(req.endpoint.path(), "/customers/abc/topup");
    assert_eq!(req.body, json!({"amount": 10.5, "method": "cash", "reference": "bar"}));
}

#[test]
fn topup_without_customer_is_malformed() {
    let env = Envelope::with_id("t2", OpKind::Topup, obj(json!({"amount": 5})), 1);
    let err = resolve(&env).expect_err("must fail");
    assert!(matches!(err, DispatchError::Malformed(_)));
    assert_eq!(err.class(), FailureClass::Terminal);
}

#[test]
fn topup_customer_id_cannot_escape_its_route() {
    for bad in ["7/../../admin", "..", ".", "7?admin=1", "7#x", "a b", "7%2F8"] {
        let env = Envelope::with_id(
            "t3",
            OpKind::Topup,
            obj(json!({"customerId": bad, "amount": 5, "method": "cash", "reference": "r"})),
            1,
        );
        let err = resolve(&env).expect_err(bad);
        assert!(matches!(err, DispatchError::Malformed(_)), "{bad}");
        assert_eq!(err.class(), FailureClass::Terminal);
    }

    let env = Envelope::with_id(
        "t4",
        OpKind::Topup,
        obj(json!({"customerId": "c-9_x", "amount": 5})),
        1,
    );
    let req = resolve(&env).expect("resolve");
    assert_eq!(req.endpoint.segments(), vec!["customers", "c-9_x", "topup"]);
    assert_eq!(req.endpoint.path(), "/customers/c-9_x/topup");
}

#[test]
fn unknown_kind_falls_back_to_transactions() {
    let env = Envelope::with_id("u1", OpKind::from("refund"), obj(json!({"items": []})), 1);
    assert_eq!(resolve(&env).expect("resolve").endpoint, Endpoint::Transactions);
    assert_eq!(String::from(env.kind().clone()), "refund");
}

#[test]
fn status_codes_classify_into_transient_and_terminal() {
    assert_eq!(DispatchError::from_status(201), Ok(()));
    assert_eq!(DispatchError::from_status(404), Err(DispatchError::Client(404)));
    assert_eq!(DispatchError::from_status(503), Err(DispatchError::Server(503)));
    assert_eq!(DispatchError::Client(409).class(), FailureClass::Terminal);
    assert_eq!(DispatchError::Server(500).class(), FailureClass::Transient);
    assert_eq!(DispatchError::Network("down".into()).class(), FailureClass::Transient);
}

#[test]
fn generated_ids_are_time_prefixed_and_distinct() {
    let a = generate_id(0x18f);
    let b = generate_id(0x18f);
    assert!(a.starts_with("18f-"));
    assert_eq!(a.len(), "18f-".len() + 8);
    assert_ne!(a, b);

    let env = Envelope::new(OpKind::Sale, Payload::new());
    assert!(env.id().starts_with(&format!("{:x}-", env.created_at())));
}
