use std::time::Duration;

use awc::error::WsProtocolError;
use awc::ws::{self, CloseCode, Frame};
use awc::Client;
use event_bus::MemoryBroker;
use futures::{Sink, SinkExt, Stream, StreamExt};
use realtime_notify_service::services::{ChatStore, NewMessage};
use realtime_notify_service::websocket::SubscriberState;
use serde_json::{json, Value};

use super::support::{access_token, start_server, token_of_type, TestServer};

async fn open(
    server: &TestServer,
    path: &str,
    token: &str,
) -> impl Stream<Item = Result<Frame, WsProtocolError>>
       + Sink<ws::Message, Error = WsProtocolError>
       + Unpin {
    let (_resp, connection) = Client::new()
        .ws(server.ws_url(path, token))
        .connect()
        .await
        .expect("connect websocket client");
    connection
}

async fn next_frame<S>(connection: &mut S) -> Frame
where
    S: Stream<Item = Result<Frame, WsProtocolError>> + Unpin,
{
    tokio::time::timeout(Duration::from_secs(5), connection.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("protocol error")
}

/// Next text frame parsed as JSON, skipping control frames.
async fn next_event<S>(connection: &mut S) -> Value
where
    S: Stream<Item = Result<Frame, WsProtocolError>> + Unpin,
{
    loop {
        match next_frame(connection).await {
            Frame::Text(bytes) => return serde_json::from_slice(&bytes).expect("json frame"),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn subscribed(server: &TestServer) {
    let mut events = server.state.subscribers.events.clone();
    let mut chat = server.state.subscribers.chat.clone();
    for rx in [&mut events, &mut chat] {
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s == SubscriberState::Subscribed),
        )
        .await
        .expect("subscriber not ready")
        .expect("subscriber gone");
    }
}

#[actix_rt::test]
async fn test_main_socket_greets_and_answers_ping() {
    let server = start_server(MemoryBroker::new()).await.expect("start server");
    let mut connection = open(&server, "/ws", &access_token("u1", "hr")).await;

    let connected = next_event(&mut connection).await;
    assert_eq!(connected["event_type"], "connected");
    assert_eq!(connected["payload"], json!({"user_id": "u1", "role": "hr"}));
    assert!(connected["timestamp"].is_string());

    connection.send(ws::Message::Text("ping".into())).await.unwrap();
    match next_frame(&mut connection).await {
        Frame::Text(bytes) => assert_eq!(&bytes[..], b"pong"),
        other => panic!("unexpected frame: {other:?}"),
    }

    server.stop().await;
}

#[actix_rt::test]
async fn test_invalid_credentials_close_with_4001() {
    let server = start_server(MemoryBroker::new()).await.expect("start server");

    for token in [token_of_type("u1", "hr", "refresh"), "garbage".to_string()] {
        let mut connection = open(&server, "/ws", &token).await;
        match next_frame(&mut connection).await {
            Frame::Close(Some(reason)) => assert_eq!(reason.code, CloseCode::Other(4001)),
            other => panic!("expected close frame, got {other:?}"),
        }
    }
    assert_eq!(server.state.registry.connection_count().await, 0);

    server.stop().await;
}

#[actix_rt::test]
async fn test_role_event_flows_through_broker_to_socket() {
    let server = start_server(MemoryBroker::new()).await.expect("start server");
    subscribed(&server).await;

    let mut candidate = open(&server, "/ws", &access_token("c1", "candidate")).await;
    let mut hr = open(&server, "/ws", &access_token("h1", "hr")).await;
    next_event(&mut candidate).await;
    next_event(&mut hr).await;

    server
        .state
        .notifications
        .notify_new_job_posted("j1", "Data Analyst", "Acme", "Lagos")
        .await;
    server
        .state
        .notifications
        .notify_hr_all("new_application", json!({"job_id": "j1"}))
        .await;

    let job = next_event(&mut candidate).await;
    assert_eq!(job["event_type"], "new_job_posted");
    assert_eq!(job["payload"]["title"], "Data Analyst");

    // The candidate never sees the staff event; the HR user sees only it.
    let application = next_event(&mut hr).await;
    assert_eq!(application["event_type"], "new_application");

    server.stop().await;
}

#[actix_rt::test]
async fn test_second_connection_replaces_first() {
    let server = start_server(MemoryBroker::new()).await.expect("start server");
    let token = access_token("u1", "candidate");

    let mut first = open(&server, "/ws", &token).await;
    next_event(&mut first).await;
    let mut second = open(&server, "/ws", &token).await;
    next_event(&mut second).await;

    match next_frame(&mut first).await {
        Frame::Close(_) => {}
        other => panic!("expected close on replaced socket, got {other:?}"),
    }
    assert_eq!(server.state.registry.connection_count().await, 1);

    server.stop().await;
}

#[actix_rt::test]
async fn test_chat_socket_reports_unread_and_delivers_messages() {
    let server = start_server(MemoryBroker::new()).await.expect("start server");
    subscribed(&server).await;
    server.store.add_user("u2", "Dana Recruiter", "recruiter").await;
    server.store.add_conversation("c1", &["u1", "u2"]).await;
    server
        .store
        .create_message(
            "u2",
            NewMessage {
                conversation_id: "c1".into(),
                content: "are you free tomorrow?".into(),
                reply_to_id: None,
            },
        )
        .await
        .unwrap();

    let mut u1 = open(&server, "/ws/chat", &access_token("u1", "candidate")).await;
    let mut u2 = open(&server, "/ws/chat", &access_token("u2", "recruiter")).await;

    let greeting = next_event(&mut u1).await;
    assert_eq!(greeting["event_type"], "chat_connected");
    assert_eq!(greeting["payload"]["unread"], 1);
    assert_eq!(greeting["payload"]["role"], "candidate");
    next_event(&mut u2).await;

    u2.send(ws::Message::Text(
        json!({"type": "typing", "conversation_id": "c1"}).to_string().into(),
    ))
    .await
    .unwrap();
    let typing = next_event(&mut u1).await;
    assert_eq!(typing["event_type"], "typing");
    assert_eq!(typing["payload"]["user_name"], "Dana Recruiter");

    u1.send(ws::Message::Text(
        json!({"type": "send", "conversation_id": "c1", "content": " yes "})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();

    for connection in [&mut u1, &mut u2] {
        let message = next_event(connection).await;
        assert_eq!(message["event_type"], "new_message");
        assert_eq!(message["payload"]["content"], "yes");
        assert_eq!(message["payload"]["sender_id"], "u1");
    }

    u1.send(ws::Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    assert_eq!(next_event(&mut u1).await["event_type"], "ping");

    server.stop().await;
}

#[actix_rt::test]
async fn test_status_endpoint_reports_presence() {
    let server = start_server(MemoryBroker::new()).await.expect("start server");
    let mut connection = open(&server, "/ws", &access_token("u1", "hr")).await;
    next_event(&mut connection).await;

    let mut resp = Client::new()
        .get(format!("http://{}/api/v1/ws/status/u1", server.addr))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["connected"], true);
    assert_eq!(body["role"], "hr");
    assert_eq!(body["chat_connected"], false);

    let mut resp = Client::new()
        .get(format!("http://{}/api/v1/ws/metrics", server.addr))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["connections"]["main"], 1);
    assert_eq!(body["rooms"]["hr"], 1);

    server.stop().await;
}
