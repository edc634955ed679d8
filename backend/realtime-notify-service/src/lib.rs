//! Real-time notification service for the DoneHR platform.
//!
//! Holds WebSocket connections for two streams, `/ws` (notifications routed
//! by user, role or broadcast) and `/ws/chat` (chat events routed to explicit
//! recipients), and bridges each to a broker channel so any process can
//! reach a client connected to any other process.
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use shutdown::Shutdown;
pub use state::AppState;
