use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use certwatch_types::api::{Claims, TokenKind};
use certwatch_types::models::Role;

use crate::error::ApiError;
use crate::middleware::JwtSecret;

fn ttl(kind: TokenKind) -> chrono::Duration {
    match kind {
        TokenKind::Access => chrono::Duration::minutes(15),
        TokenKind::Refresh => chrono::Duration::days(30),
    }
}

pub fn issue(secret: &JwtSecret, user_id: i64, role: Role, kind: TokenKind) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id,
        role,
        kind,
        iat: now.timestamp() as usize,
        exp: (now + ttl(kind)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Issue an (access, refresh) pair for a freshly authenticated user.
pub fn issue_pair(secret: &JwtSecret, user_id: i64, role: Role) -> anyhow::Result<(String, String)> {
    Ok((
        issue(secret, user_id, role, TokenKind::Access)?,
        issue(secret, user_id, role, TokenKind::Refresh)?,
    ))
}

/// Decode `token` and check signature, expiry and that it is of the
/// `expected` kind. A refresh token is never accepted as an access token.
pub fn verify(secret: &JwtSecret, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated("invalid or expired token".into()))?
    .claims;

    if claims.kind != expected {
        return Err(ApiError::Unauthenticated("wrong token type".into()));
    }
    Ok(claims)
}
