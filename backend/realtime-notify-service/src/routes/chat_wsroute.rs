use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::session::{handle_control, reject, ClientFrame, OutboundText, WsParams};
use crate::middleware::auth::authenticate;
use crate::services::ChatCommandHandler;
use crate::shutdown::Shutdown;
use crate::state::AppState;
use crate::websocket::message_types::{ChatCommand, ChatInbound};
use crate::websocket::{
    ChannelTransport, ChatRegistry, ConnectionId, Heartbeat, ServerEvent, Transport,
};

/// One authenticated client on the chat stream.
///
/// Commands run on a per-session worker task so a slow store call never
/// blocks the socket and commands from one client keep their order.
struct ChatSession {
    user_id: String,
    connection_id: ConnectionId,
    registry: ChatRegistry,
    handler: ChatCommandHandler,
    outbound: Option<UnboundedReceiver<String>>,
    commands: Option<UnboundedSender<ChatCommand>>,
    heartbeat_interval: Duration,
    shutdown: Shutdown,
    heartbeat: Option<Heartbeat>,
}

impl ChatSession {
    fn start_worker(&mut self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChatCommand>();
        let handler = self.handler.clone();
        let user_id = self.user_id.clone();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                handler.handle(&user_id, command).await;
            }
        });
        self.commands = Some(tx);
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx).map(OutboundText));
        }
        self.start_worker();
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
        // Worker drains what is queued, then exits.
        self.commands.take();

        let registry = self.registry.clone();
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            registry.release(&user_id, connection_id).await;
        });
    }
}

impl StreamHandler<OutboundText> for ChatSession {
    fn handle(&mut self, msg: OutboundText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseCode::Normal.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let text = match handle_control(msg, ctx) {
            ClientFrame::Text(text) => text,
            ClientFrame::Handled => return,
            ClientFrame::Stop => {
                ctx.stop();
                return;
            }
        };

        match ChatInbound::parse(&text) {
            ChatInbound::Command(ChatCommand::Ping) => {
                if let Ok(ping) = ServerEvent::ping().to_json() {
                    ctx.text(ping);
                }
            }
            ChatInbound::Command(command) => {
                let queued = self
                    .commands
                    .as_ref()
                    .map(|tx| tx.send(command).is_ok())
                    .unwrap_or(false);
                if !queued {
                    debug!(user_id = %self.user_id, "chat command worker gone");
                }
            }
            ChatInbound::Ignored => {
                debug!(user_id = %self.user_id, "ignoring unrecognised chat frame");
            }
        }
    }
}

#[get("/ws/chat")]
pub async fn chat_ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let identity = match authenticate(state.validator.as_ref(), query.token.as_deref(), &req) {
        Ok(identity) => identity,
        Err(e) => return reject(&req, stream, "/ws/chat", &e),
    };

    ws::handshake(&req)?;

    let unread = state.notifications.unread_count(&identity.user_id).await;

    let (transport, outbound) = ChannelTransport::pair();
    let greeting = ServerEvent::new(
        "chat_connected",
        json!({
            "user_id": identity.user_id,
            "role": identity.role,
            "unread": unread,
        }),
    );
    if let Ok(text) = greeting.to_json() {
        let _ = transport.send_text(text).await;
    }

    let registry = state.chat_registry().clone();
    let connection_id = registry
        .connect(Arc::new(transport), &identity.user_id)
        .await;

    let session = ChatSession {
        user_id: identity.user_id,
        connection_id,
        registry,
        handler: state.chat_commands.clone(),
        outbound: Some(outbound),
        commands: None,
        heartbeat_interval: state.config.heartbeat_interval,
        shutdown: state.shutdown.clone(),
        heartbeat: None,
    };

    ws::start(session, &req, stream)
}
