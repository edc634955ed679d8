use actix_web::{get, web, HttpResponse};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Presence of one user on this process.
#[get("/api/v1/ws/status/{user_id}")]
pub async fn ws_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("user_id must not be empty".into()));
    }

    let connected = state.registry.is_connected(user_id).await;
    let role = state.registry.role_of(user_id).await;
    let chat_connected = state.chat_registry().is_connected(user_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "connected": connected,
        "role": role,
        "chat_connected": chat_connected,
    })))
}

/// Connection counts and subscriber health for this process.
#[get("/api/v1/ws/metrics")]
pub async fn ws_metrics(state: web::Data<AppState>) -> HttpResponse {
    let events_state = *state.subscribers.events.borrow();
    let chat_state = *state.subscribers.chat.borrow();

    HttpResponse::Ok().json(json!({
        "connections": {
            "main": state.registry.connection_count().await,
            "chat": state.chat_registry().connection_count().await,
        },
        "rooms": state.registry.room_sizes().await,
        "subscribers": {
            "events": events_state,
            "chat": chat_state,
        },
    }))
}
