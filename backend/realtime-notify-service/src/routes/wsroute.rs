use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::session::{handle_control, reject, ClientFrame, OutboundText, WsParams};
use crate::middleware::auth::authenticate;
use crate::shutdown::Shutdown;
use crate::state::AppState;
use crate::websocket::{
    ChannelTransport, ConnectionId, Heartbeat, MainRegistry, ServerEvent, Transport,
};

/// One authenticated client on the main notification stream.
struct NotifySession {
    user_id: String,
    connection_id: ConnectionId,
    registry: MainRegistry,
    outbound: Option<UnboundedReceiver<String>>,
    heartbeat_interval: Duration,
    shutdown: Shutdown,
    heartbeat: Option<Heartbeat>,
}

impl Actor for NotifySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx).map(OutboundText));
        }
        self.heartbeat = Some(Heartbeat::spawn(
            self.registry.clone(),
            self.user_id.clone(),
            self.connection_id,
            self.heartbeat_interval,
            self.shutdown.listener(),
        ));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.heartbeat.take();

        let registry = self.registry.clone();
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            registry.release(&user_id, connection_id).await;
        });
    }
}

impl StreamHandler<OutboundText> for NotifySession {
    fn handle(&mut self, msg: OutboundText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }

    /// The registry dropped this connection (replaced or released).
    fn finished(&mut self, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseCode::Normal.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for NotifySession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match handle_control(msg, ctx) {
            ClientFrame::Text(text) if text.trim() == "ping" => ctx.text("pong"),
            ClientFrame::Text(text) => {
                debug!(user_id = %self.user_id, len = text.len(), "ignoring client text");
            }
            ClientFrame::Handled => {}
            ClientFrame::Stop => ctx.stop(),
        }
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let identity = match authenticate(state.validator.as_ref(), query.token.as_deref(), &req) {
        Ok(identity) => identity,
        Err(e) => return reject(&req, stream, "/ws", &e),
    };

    // Refuse bad upgrades before touching the registry.
    ws::handshake(&req)?;

    let (transport, outbound) = ChannelTransport::pair();
    let connected = ServerEvent::new(
        "connected",
        json!({ "user_id": identity.user_id, "role": identity.role }),
    );
    if let Ok(text) = connected.to_json() {
        let _ = transport.send_text(text).await;
    }

    let connection_id = state
        .registry
        .connect(Arc::new(transport), &identity.user_id, &identity.role)
        .await;

    let session = NotifySession {
        user_id: identity.user_id,
        connection_id,
        registry: state.registry.clone(),
        outbound: Some(outbound),
        heartbeat_interval: state.config.heartbeat_interval,
        shutdown: state.shutdown.clone(),
        heartbeat: None,
    };

    ws::start(session, &req, stream)
}
