//! Pieces shared by the `/ws` and `/ws/chat` session actors.
use actix::{Actor, ActorContext, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tracing::warn;

use crate::middleware::{AuthError, WS_CLOSE_INVALID_TOKEN};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Frame queued for a session by the registry.
pub(crate) struct OutboundText(pub String);

/// Completes the upgrade, then closes straight away with 4001.
struct RejectedSession;

impl Actor for RejectedSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Other(WS_CLOSE_INVALID_TOKEN),
            description: Some("invalid or expired credential".into()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectedSession {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}

pub(crate) fn reject(
    req: &HttpRequest,
    stream: web::Payload,
    endpoint: &str,
    error: &AuthError,
) -> Result<HttpResponse, Error> {
    warn!(endpoint = %endpoint, error = %error, "ws_auth_failed");
    ws::start(RejectedSession, req, stream)
}

/// Client frames common to both sessions.
pub(crate) enum ClientFrame {
    Text(String),
    Handled,
    Stop,
}

/// Answer control frames; hand text frames back to the caller.
pub(crate) fn handle_control<A>(
    msg: Result<ws::Message, ws::ProtocolError>,
    ctx: &mut ws::WebsocketContext<A>,
) -> ClientFrame
where
    A: Actor<Context = ws::WebsocketContext<A>>,
{
    match msg {
        Ok(ws::Message::Text(text)) => ClientFrame::Text(text.to_string()),
        Ok(ws::Message::Ping(bytes)) => {
            ctx.pong(&bytes);
            ClientFrame::Handled
        }
        Ok(ws::Message::Close(reason)) => {
            ctx.close(reason);
            ClientFrame::Stop
        }
        Ok(ws::Message::Pong(_))
        | Ok(ws::Message::Binary(_))
        | Ok(ws::Message::Continuation(_))
        | Ok(ws::Message::Nop) => ClientFrame::Handled,
        Err(e) => {
            warn!(error = %e, "ws protocol error");
            ClientFrame::Stop
        }
    }
}
