use std::sync::Arc;
use std::time::Duration;

use event_bus::{Broker, MemoryBroker};
use realtime_notify_service::services::{
    ChannelPublisher, ChatHub, EventPublisher, FallbackStrategy, PublishOutcome,
};
use realtime_notify_service::websocket::ChatRegistry;
use serde_json::json;

use super::support::{drain, transport, DownBroker};

fn down(channel: &str) -> ChannelPublisher {
    ChannelPublisher::new(Arc::new(DownBroker), channel, Duration::from_millis(100))
}

#[tokio::test]
async fn test_main_publish_with_broker_down_is_dropped_not_raised() {
    let publisher = EventPublisher::new(down("donehr:events"));

    let outcomes = [
        publisher.notify_user("u1", "x", json!({})).await,
        publisher.notify_role("hr", "x", json!({})).await,
        publisher.notify_hr_all("x", json!({})).await,
        publisher.broadcast("x", json!({})).await,
    ];

    assert!(outcomes.iter().all(|o| *o == PublishOutcome::Dropped));
}

#[tokio::test]
async fn test_chat_publish_falls_back_to_local_delivery() {
    let registry = ChatRegistry::new("chat");
    let (t1, mut u1) = transport();
    let (t2, mut u2) = transport();
    registry.connect(t1, "u1").await;
    registry.connect(t2, "u2").await;

    let hub = ChatHub::new(registry, down("donehr:chat"));
    let outcome = hub
        .publish_to_recipients(
            "new_message",
            json!({"content": "hi"}),
            &["u1".to_string(), "u3".to_string()],
        )
        .await;

    assert_eq!(outcome, PublishOutcome::DeliveredLocally { recipients: 1 });
    assert_eq!(drain(&mut u1), vec!["new_message"]);
    assert!(drain(&mut u2).is_empty());
}

#[tokio::test]
async fn test_chat_publish_without_fallback_drops() {
    let registry = ChatRegistry::new("chat");
    let (t, mut u1) = transport();
    registry.connect(t, "u1").await;

    let hub = ChatHub::new(registry, down("donehr:chat")).with_fallback(FallbackStrategy::Drop);
    let outcome = hub
        .publish_to_recipients("typing", json!({}), &["u1".to_string()])
        .await;

    assert_eq!(outcome, PublishOutcome::Dropped);
    assert!(drain(&mut u1).is_empty());
}

#[tokio::test]
async fn test_chat_publish_with_healthy_broker_does_not_deliver_locally() {
    let broker = MemoryBroker::new();
    let mut sub = broker.subscribe("donehr:chat").await.unwrap();
    let registry = ChatRegistry::new("chat");
    let (t, mut u1) = transport();
    registry.connect(t, "u1").await;

    let hub = ChatHub::new(
        registry,
        ChannelPublisher::new(Arc::new(broker.clone()), "donehr:chat", Duration::from_secs(1)),
    );
    let outcome = hub
        .publish_to_recipients("new_message", json!({}), &["u1".to_string()])
        .await;

    assert_eq!(outcome, PublishOutcome::Published { receivers: 1 });
    // Delivery happens when the subscriber loop sees the broker message.
    assert!(drain(&mut u1).is_empty());
    assert!(sub.next_message().await.unwrap().unwrap().contains("\"recipients\":[\"u1\"]"));
}
