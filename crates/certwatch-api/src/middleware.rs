use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use certwatch_types::api::{Claims, INTERNAL_TOKEN_HEADER, TokenKind};

use crate::error::ApiError;
use crate::token;

/// HMAC secret shared by every service that issues or verifies tokens.
#[derive(Clone)]
pub struct JwtSecret(Arc<str>);

impl JwtSecret {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Shared secret for service-to-service calls. `None` leaves internal
/// endpoints open.
#[derive(Clone, Default)]
pub struct InternalToken(Option<Arc<str>>);

impl InternalToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.map(Into::into))
    }

    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Claims of the caller if a valid access token was presented, inserted by
/// [`attach_claims`] on routes where authentication is optional.
#[derive(Debug, Clone)]
pub struct MaybeClaims(pub Option<Claims>);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Extract and validate an access token from the Authorization header.
pub async fn require_auth(
    State(secret): State<JwtSecret>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".into()))?;

    let claims = token::verify(&secret, token, TokenKind::Access)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like [`require_auth`] but never rejects: an absent or invalid token just
/// yields `MaybeClaims(None)`.
pub async fn attach_claims(State(secret): State<JwtSecret>, mut req: Request, next: Next) -> Response {
    let claims = bearer_token(req.headers())
        .and_then(|token| token::verify(&secret, token, TokenKind::Access).ok());

    req.extensions_mut().insert(MaybeClaims(claims));
    next.run(req).await
}

/// Gate for service-to-service endpoints.
pub async fn require_internal(
    State(expected): State<InternalToken>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = expected.get() {
        let presented = req
            .headers()
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            return Err(ApiError::forbidden("internal endpoint"));
        }
    }
    Ok(next.run(req).await)
}

pub fn ensure_manager(claims: &Claims) -> Result<(), ApiError> {
    if claims.is_manager() {
        Ok(())
    } else {
        Err(ApiError::forbidden("manager role required"))
    }
}
