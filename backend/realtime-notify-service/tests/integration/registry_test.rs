use realtime_notify_service::websocket::{ChatRegistry, Dispatch, EventEnvelope, MainRegistry};
use serde_json::json;

use super::support::{drain, transport};

#[tokio::test]
async fn test_role_scenario_hr_and_candidate() {
    let registry = MainRegistry::new("main");
    let (t1, mut u1) = transport();
    let (t2, mut u2) = transport();
    registry.connect(t1, "u1", "hr").await;
    registry.connect(t2, "u2", "candidate").await;

    registry.broadcast_to_role("hr", "x", json!({})).await;
    assert_eq!(drain(&mut u1), vec!["x"]);
    assert!(drain(&mut u2).is_empty());

    registry.broadcast_to_all("y", json!({})).await;
    assert_eq!(drain(&mut u1), vec!["y"]);
    assert_eq!(drain(&mut u2), vec!["y"]);

    registry.disconnect("u1").await;
    registry.broadcast_to_role("hr", "z", json!({})).await;
    assert!(drain(&mut u1).is_empty());
    assert!(drain(&mut u2).is_empty());
}

#[tokio::test]
async fn test_disconnected_user_receives_nothing_afterwards() {
    let registry = MainRegistry::new("main");
    let (t, mut rx) = transport();
    registry.connect(t, "u1", "recruiter").await;
    registry.disconnect("u1").await;

    assert!(!registry.broadcast_to_user("u1", "x", json!({})).await);
    assert_eq!(registry.broadcast_to_role("recruiter", "x", json!({})).await, 0);
    assert_eq!(registry.broadcast_to_all("x", json!({})).await, 0);
    assert!(drain(&mut rx).is_empty());
    assert!(registry.role_members("recruiter").await.is_empty());
}

#[tokio::test]
async fn test_broadcast_to_user_reaches_only_that_user() {
    let registry = MainRegistry::new("main");
    let (t1, mut u1) = transport();
    let (t2, mut u2) = transport();
    registry.connect(t1, "u1", "candidate").await;
    registry.connect(t2, "u2", "candidate").await;

    registry.broadcast_to_user("u2", "offer", json!({"job": "j1"})).await;

    assert!(drain(&mut u1).is_empty());
    assert_eq!(drain(&mut u2), vec!["offer"]);
}

#[tokio::test]
async fn test_reregistering_replaces_connection_and_role_entry() {
    let registry = MainRegistry::new("main");
    let (t1, mut old) = transport();
    let (t2, mut new) = transport();
    registry.connect(t1, "u1", "hr").await;
    registry.connect(t2, "u1", "hr").await;

    assert_eq!(registry.role_members("hr").await, vec!["u1"]);
    assert_eq!(registry.connection_count().await, 1);

    registry.broadcast_to_role("hr", "x", json!({})).await;
    assert!(drain(&mut old).is_empty());
    assert_eq!(drain(&mut new), vec!["x"]);

    // The replaced transport was dropped by the registry.
    assert!(old.recv().await.is_none());
}

#[tokio::test]
async fn test_dead_transport_is_evicted_by_broadcast() {
    let registry = MainRegistry::new("main");
    let (t1, u1) = transport();
    let (t2, mut u2) = transport();
    registry.connect(t1, "u1", "hr").await;
    registry.connect(t2, "u2", "hr").await;
    drop(u1);

    let delivered = registry.broadcast_to_role("hr", "x", json!({})).await;

    assert_eq!(delivered, 1);
    assert_eq!(drain(&mut u2), vec!["x"]);
    assert!(!registry.is_connected("u1").await);
    assert_eq!(registry.role_members("hr").await, vec!["u2"]);
}

#[tokio::test]
async fn test_hr_all_envelope_spans_staff_roles_only() {
    let registry = MainRegistry::new("main");
    let mut staff = Vec::new();
    for (user, role) in [
        ("a", "hr"),
        ("b", "hr_admin"),
        ("c", "hiring_manager"),
        ("d", "recruiter"),
        ("e", "superadmin"),
        ("f", "admin"),
        ("g", "elite_admin"),
    ] {
        let (t, rx) = transport();
        registry.connect(t, user, role).await;
        staff.push(rx);
    }
    let (t, mut candidate) = transport();
    registry.connect(t, "z", "candidate").await;

    let envelope = EventEnvelope::new("new_application", json!({"job_id": "j1"})).for_role("hr_all");
    assert_eq!(registry.dispatch(&envelope).await, 7);

    for rx in staff.iter_mut() {
        assert_eq!(drain(rx), vec!["new_application"]);
    }
    assert!(drain(&mut candidate).is_empty());
}

#[tokio::test]
async fn test_chat_registry_routes_by_recipient_list() {
    let registry = ChatRegistry::new("chat");
    let (t1, mut u1) = transport();
    let (t2, mut u2) = transport();
    registry.connect(t1, "u1").await;
    registry.connect(t2, "u2").await;

    registry
        .dispatch_raw(r#"{"event_type":"typing","payload":{"conversation_id":"c1"},"recipients":["u2","u9"]}"#)
        .await
        .unwrap();

    assert!(drain(&mut u1).is_empty());
    assert_eq!(drain(&mut u2), vec!["typing"]);
}
