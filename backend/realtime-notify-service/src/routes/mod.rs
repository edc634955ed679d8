pub mod chat_wsroute;
pub mod session;
pub mod status;
pub mod wsroute;

use actix_web::web;

use crate::metrics;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(status::health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(wsroute::ws_handler)
        .service(chat_wsroute::chat_ws_handler)
        .service(status::ws_status)
        .service(status::ws_metrics);
}
