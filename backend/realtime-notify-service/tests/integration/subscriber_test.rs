use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use event_bus::{Broker, MemoryBroker};
use realtime_notify_service::services::{ChannelPublisher, EventPublisher, PublishOutcome};
use realtime_notify_service::websocket::{MainRegistry, SubscriberLoop, SubscriberState};
use realtime_notify_service::Shutdown;
use serde_json::json;
use tokio::sync::watch;

use super::support::{drain, transport, DownBroker, FlakyBroker};

async fn reach(rx: &mut watch::Receiver<SubscriberState>, wanted: SubscriberState) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
        .await
        .expect("subscriber state not reached")
        .expect("subscriber gone");
}

#[tokio::test]
async fn test_event_published_on_one_process_reaches_client_on_another() {
    let broker = MemoryBroker::new();
    let shutdown = Shutdown::new();

    // Process A holds the client, process B only publishes.
    let registry_a = MainRegistry::new("main");
    let (t, mut client) = transport();
    registry_a.connect(t, "u1", "candidate").await;

    let loop_a = SubscriberLoop::new(
        Arc::new(broker.clone()),
        "donehr:events",
        registry_a.clone(),
        Duration::from_millis(10),
    );
    let mut state_a = loop_a.state();
    let task = loop_a.spawn(shutdown.listener());
    reach(&mut state_a, SubscriberState::Subscribed).await;

    let publisher_b = EventPublisher::new(ChannelPublisher::new(
        Arc::new(broker.clone()),
        "donehr:events",
        Duration::from_secs(1),
    ));
    let outcome = publisher_b
        .notify_user("u1", "application_status_changed", json!({"new_status": "hired"}))
        .await;
    assert_eq!(outcome, PublishOutcome::Published { receivers: 1 });

    let frame = tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(frame.contains("application_status_changed"));

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_loop_resubscribes_after_broker_outage() {
    let memory = MemoryBroker::new();
    let flaky = Arc::new(FlakyBroker::new(memory.clone(), 3));
    let shutdown = Shutdown::new();

    let registry = MainRegistry::new("main");
    let (t, mut client) = transport();
    registry.connect(t, "u1", "hr").await;

    let subscriber = SubscriberLoop::new(
        flaky.clone(),
        "donehr:events",
        registry,
        Duration::from_millis(5),
    );
    let mut state = subscriber.state();
    let task = subscriber.spawn(shutdown.listener());

    reach(&mut state, SubscriberState::Subscribed).await;
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 4);

    memory
        .publish("donehr:events", r#"{"event_type":"x","payload":{},"target_role":"hr"}"#.into())
        .await
        .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(frame.contains(r#""event_type":"x""#));

    shutdown.trigger();
    task.await.unwrap();
    assert_eq!(*state.borrow(), SubscriberState::Terminated);
}

#[tokio::test]
async fn test_malformed_messages_do_not_stop_the_loop() {
    let broker = MemoryBroker::new();
    let shutdown = Shutdown::new();
    let registry = MainRegistry::new("main");
    let (t, mut client) = transport();
    registry.connect(t, "u1", "candidate").await;

    let subscriber = SubscriberLoop::new(
        Arc::new(broker.clone()),
        "donehr:events",
        registry,
        Duration::from_millis(5),
    );
    let mut state = subscriber.state();
    let task = subscriber.spawn(shutdown.listener());
    reach(&mut state, SubscriberState::Subscribed).await;

    for bad in ["", "[]", "{\"payload\":{}}", "not json at all"] {
        broker.publish("donehr:events", bad.into()).await.unwrap();
    }
    broker
        .publish("donehr:events", r#"{"event_type":"still_alive","payload":{}}"#.into())
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(frame.contains("still_alive"));
    assert!(drain(&mut client).is_empty());

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_during_backoff_terminates() {
    let shutdown = Shutdown::new();
    let subscriber = SubscriberLoop::new(
        Arc::new(DownBroker),
        "donehr:events",
        MainRegistry::new("main"),
        Duration::from_secs(3600),
    );
    let mut state = subscriber.state();
    let task = subscriber.spawn(shutdown.listener());

    reach(&mut state, SubscriberState::Backoff).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(*state.borrow(), SubscriberState::Terminated);
}
