pub mod auth;

pub use auth::{AuthError, Identity, JwtValidator, TokenValidator, WS_CLOSE_INVALID_TOKEN};
