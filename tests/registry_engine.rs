use beacon::domain::RegistrationRequest;
use beacon::registry::engine::ProbeOutcome;
use beacon::registry::{RegistryEngine, RegistryError, RegistryEvent};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const REG_KEY: &str = "abc123";

fn engine() -> RegistryEngine {
    RegistryEngine::new(REG_KEY)
}

fn users_request(port: &str) -> RegistrationRequest {
    RegistrationRequest::new("users", "localhost", port)
}

#[test]
fn registration_requires_the_shared_key() {
    let engine = engine();
    let err = engine
        .register(users_request("3000"), "wrong")
        .expect_err("bad key must be rejected");
    assert_eq!(err, RegistryError::Authentication);
    assert_eq!(engine.instance_count(), 0);
    assert_eq!(engine.service_type_count(), 0);
}

#[test]
fn successful_registration_round_trips() {
    let engine = engine();
    let receipt = engine
        .register(
            users_request("3000").with_meta("zone", "eu-1"),
            REG_KEY,
        )
        .expect("registration succeeds");

    let record = engine
        .instance_by_id(&receipt.id)
        .expect("record is retrievable");
    assert_eq!(record.service_type, "users");
    assert_eq!(record.host, "localhost");
    assert_eq!(record.port, "3000");
    assert!(record.healthy);
    assert_eq!(record.created, record.last_updated);
    assert_eq!(record.meta.get("zone").map(String::as_str), Some("eu-1"));

    let listed = engine.instances_by_type("users");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, receipt.id);

    assert!(engine.validate_instance_auth(&receipt.id, &receipt.token));
    assert!(!engine.validate_instance_auth(&receipt.id, "x"));
    assert!(!engine.validate_instance_auth("no-such-id", &receipt.token));
}

#[test]
fn listing_groups_by_service_type() {
    let engine = engine();
    for port in ["3000", "3001", "3002"] {
        engine.register(users_request(port), REG_KEY).unwrap();
    }
    engine
        .register(
            RegistrationRequest::new("products", "localhost", "3004"),
            REG_KEY,
        )
        .unwrap();

    let users = engine.instances_by_type("users");
    let products = engine.instances_by_type("products");
    assert_eq!(users.len(), 3);
    assert_eq!(products.len(), 1);

    let types: HashSet<&str> = users.iter().map(|r| r.service_type.as_str()).collect();
    assert_eq!(types.len(), 1);

    assert!(engine.instances_by_type("nothing-registered").is_empty());
}

#[test]
fn unregister_removes_and_is_idempotent() {
    let engine = engine();
    let receipt = engine.register(users_request("3000"), REG_KEY).unwrap();

    engine.unregister(&receipt.id).unwrap();
    assert!(engine.instance_by_id(&receipt.id).is_none());
    assert!(engine.instances_by_type("users").is_empty());
    assert!(!engine.validate_instance_auth(&receipt.id, &receipt.token));

    engine.unregister(&receipt.id).unwrap();
    assert_eq!(engine.instance_count(), 0);
    assert_eq!(engine.service_type_count(), 0);
}

#[test]
fn ids_and_tokens_are_unique() {
    let engine = engine();
    let mut ids = HashSet::new();
    let mut tokens = HashSet::new();

    for i in 0..100 {
        let receipt = engine
            .register(users_request(&format!("{}", 3000 + i)), REG_KEY)
            .unwrap();
        assert!(ids.insert(receipt.id), "duplicate id minted");
        assert!(tokens.insert(receipt.token), "duplicate token minted");
    }
}

#[test]
fn probe_outcomes_toggle_visibility_without_removal() {
    let engine = engine();
    let receipt = engine.register(users_request("3000"), REG_KEY).unwrap();
    let snapshot = engine.instance_by_id(&receipt.id).unwrap();

    engine.record_probe_outcome(&snapshot, ProbeOutcome::Failed);
    let record = engine.instance_by_id(&receipt.id).expect("never purged");
    assert!(!record.healthy);
    assert!(engine.instances_by_type("users").is_empty());

    // Repeat failures do not compound.
    engine.record_probe_outcome(&snapshot, ProbeOutcome::Failed);
    let after_repeat = engine.instance_by_id(&receipt.id).unwrap();
    assert_eq!(after_repeat.last_updated, record.last_updated);

    engine.record_probe_outcome(&snapshot, ProbeOutcome::Passed { body: json!({}) });
    let recovered = engine.instance_by_id(&receipt.id).unwrap();
    assert!(recovered.healthy);
    assert_eq!(engine.instances_by_type("users").len(), 1);
}

#[test]
fn subscribers_observe_committed_state() {
    let engine = Arc::new(RegistryEngine::new(REG_KEY));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let lookup = Arc::clone(&engine);
    let sink = Arc::clone(&observed);
    engine.subscribe(move |event| {
        if let RegistryEvent::InstanceRegistered { instance } = event {
            let found = lookup
                .instance_by_id(&instance.id)
                .expect("registered instance visible inside the handler");
            assert_eq!(found.service_type, instance.service_type);
            sink.lock().unwrap().push(instance.id.clone());
        }
    });

    let first = engine.register(users_request("3000"), REG_KEY).unwrap();
    let second = engine.register(users_request("3001"), REG_KEY).unwrap();

    let observed = observed.lock().unwrap();
    assert_eq!(*observed, vec![first.id, second.id], "emission order matches commit order");
}

#[test]
fn panicking_subscriber_does_not_corrupt_state() {
    let engine = Arc::new(RegistryEngine::new(REG_KEY));
    let later = Arc::new(Mutex::new(0usize));

    engine.subscribe(|_event| panic!("subscriber bug"));
    let counter = Arc::clone(&later);
    engine.subscribe(move |_event| {
        *counter.lock().unwrap() += 1;
    });

    let receipt = engine.register(users_request("3000"), REG_KEY).unwrap();
    assert!(engine.instance_by_id(&receipt.id).is_some());
    assert_eq!(
        *later.lock().unwrap(),
        1,
        "subscribers after the panicking one still run"
    );
}

#[test]
fn disposed_engine_rejects_mutations_and_reads_as_empty() {
    let engine = Arc::new(RegistryEngine::new(REG_KEY));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.subscribe(move |event| sink.lock().unwrap().push(event.kind()));

    let receipt = engine.register(users_request("3000"), REG_KEY).unwrap();
    let snapshot = engine.instance_by_id(&receipt.id).unwrap();

    engine.dispose();
    engine.dispose();
    assert!(engine.is_disposed());

    assert!(engine.instance_by_id(&receipt.id).is_none());
    assert!(engine.instances_by_type("users").is_empty());
    assert_eq!(engine.instance_count(), 0);
    assert!(!engine.validate_instance_auth(&receipt.id, &receipt.token));

    assert_eq!(
        engine.register(users_request("3001"), REG_KEY),
        Err(RegistryError::Disposed)
    );
    assert_eq!(engine.unregister(&receipt.id), Err(RegistryError::Disposed));

    // No event fires once disposed, not even for late probe feedback.
    engine.record_probe_outcome(&snapshot, ProbeOutcome::Failed);
    assert_eq!(*events.lock().unwrap(), vec!["instance_registered"]);
}

#[test]
fn init_rehydrates_a_disposed_engine() {
    let engine = engine();
    engine.register(users_request("3000"), REG_KEY).unwrap();
    engine.dispose();
    engine.init();

    assert!(!engine.is_disposed());
    assert_eq!(engine.instance_count(), 0, "rehydrated registry starts empty");

    let receipt = engine.register(users_request("3001"), REG_KEY).unwrap();
    assert!(engine.instance_by_id(&receipt.id).is_some());
}

#[test]
fn init_on_a_running_engine_is_a_no_op() {
    let engine = engine();
    let receipt = engine.register(users_request("3000"), REG_KEY).unwrap();
    engine.init();
    assert!(
        engine.instance_by_id(&receipt.id).is_some(),
        "init must not clear a running registry"
    );
}
