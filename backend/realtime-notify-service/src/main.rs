use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::dev::Service;
use actix_web::{middleware, web, App, HttpServer};
use event_bus::{Broker, RedisBroker};
use realtime_notify_service::middleware::{JwtValidator, TokenValidator};
use realtime_notify_service::services::{ChatStore, PgChatStore};
use realtime_notify_service::{logging, metrics, routes, AppError, AppState, Config};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Arc::new(Config::from_env()?);
    info!(
        port = config.port,
        events_channel = %config.events_channel,
        chat_channel = %config.chat_channel,
        "Starting realtime-notify-service"
    );

    // Lazy: chat greetings degrade to unread=0 while Postgres is down.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(&config.database_url)?;

    let broker: Arc<dyn Broker> = Arc::new(RedisBroker::open(&config.redis_url)?);
    let chat_store: Arc<dyn ChatStore> = Arc::new(PgChatStore::new(pool));
    let validator: Arc<dyn TokenValidator> =
        Arc::new(JwtValidator::new(&config.jwt_secret, config.jwt_algorithm));

    let (state, subscribers) = AppState::build(config.clone(), broker, chat_store, validator);
    let shutdown = state.shutdown.clone();
    let subscriber_tasks = subscribers.spawn(&shutdown);

    let app_state = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .unwrap_or_else(|| "unmatched".to_string());
                let started = Instant::now();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;
                    metrics::observe_http_request(
                        &method,
                        &path,
                        res.status().as_u16(),
                        started.elapsed(),
                    );
                    Ok(res)
                }
            })
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run();

    info!(port = config.port, "HTTP server listening");
    let result = server.await;

    info!("HTTP server stopped, stopping subscribers");
    shutdown.trigger();
    for task in subscriber_tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "subscriber task ended abnormally");
        }
    }

    result.map_err(|e| AppError::StartServer(e.to_string()))
}
