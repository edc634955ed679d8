use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

/// WebSocket close code sent when the handshake token is rejected.
pub const WS_CLOSE_INVALID_TOKEN: u16 = 4001;

const ACCESS_TOKEN_TYPE: &str = "access";

/// Authenticated identity of a WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token is not an access token")]
    WrongTokenType,
    #[error("token has no subject")]
    MissingSubject,
}

/// Turns a bearer token into an [`Identity`].
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    role: String,
    #[serde(rename = "type", default)]
    token_type: String,
}

/// HMAC-signed access tokens issued by the platform API.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let claims = data.claims;

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType);
        }
        if claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }

        Ok(Identity {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Token from `?token=` first, then `Authorization: Bearer`.
pub fn extract_token(query_token: Option<&str>, req: &HttpRequest) -> Option<String> {
    query_token
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| {
            req.headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
        })
}

/// Extract and validate in one step.
pub fn authenticate(
    validator: &dyn TokenValidator,
    query_token: Option<&str>,
    req: &HttpRequest,
) -> Result<Identity, AuthError> {
    let token = extract_token(query_token, req).ok_or(AuthError::MissingToken)?;
    validator.validate(&token)
}
