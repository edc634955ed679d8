use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use async_trait::async_trait;
use chrono::Utc;
use event_bus::{Broker, BrokerError, MemoryBroker, Subscription};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use realtime_notify_service::middleware::{JwtValidator, TokenValidator};
use realtime_notify_service::services::{ChatStore, MemoryChatStore};
use realtime_notify_service::websocket::{ChannelTransport, ServerEvent, Transport};
use realtime_notify_service::{routes, AppState, Config};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

pub const SECRET: &str = "integration-secret-integration-secret";

/// Short enough that reconnect tests finish quickly.
pub const TEST_BACKOFF: Duration = Duration::from_millis(20);

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("DATABASE_URL".to_string(), "postgres://localhost/donehr_test".to_string()),
        ("JWT_SECRET".to_string(), SECRET.to_string()),
    ]);
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    let mut config = Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config");
    config.subscriber_backoff = TEST_BACKOFF;
    config
}

pub fn access_token(user_id: &str, role: &str) -> String {
    token_of_type(user_id, role, "access")
}

pub fn token_of_type(user_id: &str, role: &str, token_type: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": user_id,
            "role": role,
            "type": token_type,
            "exp": Utc::now().timestamp() + 3600,
        }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn transport() -> (Arc<dyn Transport>, UnboundedReceiver<String>) {
    let (transport, rx) = ChannelTransport::pair();
    (Arc::new(transport), rx)
}

/// Event types queued so far, without waiting.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(ServerEvent::from_json(&frame).expect("server event").event_type);
    }
    out
}

/// Broker whose every call fails.
pub struct DownBroker;

#[async_trait]
impl Broker for DownBroker {
    async fn publish(&self, channel: &str, _payload: String) -> event_bus::Result<usize> {
        Err(BrokerError::Publish {
            channel: channel.to_string(),
            reason: "connection refused".into(),
        })
    }

    async fn subscribe(&self, _channel: &str) -> event_bus::Result<Box<dyn Subscription>> {
        Err(BrokerError::Connection("connection refused".into()))
    }
}

/// Fails the first `failures` subscribe calls, then behaves like `inner`.
pub struct FlakyBroker {
    pub inner: MemoryBroker,
    failures: usize,
    pub attempts: AtomicUsize,
}

impl FlakyBroker {
    pub fn new(inner: MemoryBroker, failures: usize) -> Self {
        Self {
            inner,
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn publish(&self, channel: &str, payload: String) -> event_bus::Result<usize> {
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> event_bus::Result<Box<dyn Subscription>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(BrokerError::Connection("redis restarting".into()));
        }
        self.inner.subscribe(channel).await
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub state: AppState,
    pub store: MemoryChatStore,
}

impl TestServer {
    pub fn ws_url(&self, path: &str, token: &str) -> String {
        format!("http://{}{}?token={}", self.addr, path, token)
    }

    pub async fn stop(self) {
        self.state.shutdown.trigger();
        self.handle.stop(true).await;
    }
}

/// Full service on an ephemeral port, subscriber loops running on `broker`.
pub async fn start_server(broker: MemoryBroker) -> std::io::Result<TestServer> {
    let store = MemoryChatStore::new();
    let chat_store: Arc<dyn ChatStore> = Arc::new(store.clone());
    let validator: Arc<dyn TokenValidator> = Arc::new(JwtValidator::new(SECRET, Algorithm::HS256));

    let (state, subscribers) = AppState::build(
        Arc::new(test_config(&[])),
        Arc::new(broker),
        chat_store,
        validator,
    );
    subscribers.spawn(&state.shutdown);

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let app_state = web::Data::new(state.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .workers(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    actix_rt::spawn(server);

    Ok(TestServer {
        addr,
        handle,
        state,
        store,
    })
}
