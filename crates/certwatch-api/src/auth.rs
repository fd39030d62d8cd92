use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Extension, Json,
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use rand_core::OsRng;
use tokio_util::sync::CancellationToken;
use tracing::info;

use certwatch_db::Database;
use certwatch_db::models::NewIdentity;
use certwatch_gateway::connection;
use certwatch_gateway::dispatcher::EventBus;
use certwatch_types::api::{
    AuthResponse, Claims, LoginRequest, RefreshResponse, RegisterRequest, TokenKind,
    UpdateIdentityRequest, UserUpdatedResponse,
};
use certwatch_types::events::ChangeEvent;
use certwatch_types::models::{Role, UserSnapshot, non_blank};

use crate::error::ApiError;
use crate::middleware::{InternalToken, JwtSecret, MaybeClaims, bearer_token};
use crate::{run_db, token};

pub type AuthState = Arc<AuthStateInner>;

pub struct AuthStateInner {
    pub db: Arc<Database>,
    pub bus: EventBus,
    pub jwt_secret: JwtSecret,
    pub internal_token: InternalToken,
    /// Cancelled on process shutdown; closes open event streams.
    pub shutdown: CancellationToken,
}

/// Credentials of the manager seeded on first startup.
#[derive(Debug, Clone)]
pub struct DefaultManager {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Parse an optional role string, falling back to `default` when absent or
/// blank.
pub fn parse_role(raw: Option<&str>, default: Role) -> Result<Role, ApiError> {
    match non_blank(raw) {
        None => Ok(default),
        Some(role) => role
            .parse()
            .map_err(|e: certwatch_types::models::UnknownRole| ApiError::validation(e.to_string())),
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn auth_response(state: &AuthState, user: UserSnapshot) -> Result<AuthResponse, ApiError> {
    let (access_token, refresh_token) =
        token::issue_pair(&state.jwt_secret, user.id, user.role).map_err(ApiError::Internal)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user,
    })
}

pub async fn register(
    State(state): State<AuthState>,
    Extension(MaybeClaims(caller)): Extension<MaybeClaims>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    let password = req.password;
    if username.is_empty() || email.is_empty() || password.trim().is_empty() {
        return Err(ApiError::validation("username, email and password are required"));
    }

    let role = parse_role(req.role.as_deref(), Role::User)?;
    if role == Role::Manager && !caller.as_ref().is_some_and(Claims::is_manager) {
        return Err(ApiError::forbidden("only a manager can register another manager"));
    }
    let phone = non_blank(req.phone.as_deref());

    // Check both uniqueness constraints up front so the caller learns which
    // one failed; the UNIQUE columns still catch a concurrent duplicate.
    let (u, e) = (username.clone(), email.clone());
    let taken = run_db(&state.db, move |db| {
        if db.get_identity_by_username(&u)?.is_some() {
            return Ok(Some("username"));
        }
        if db.get_identity_by_email(&e)?.is_some() {
            return Ok(Some("email"));
        }
        Ok(None)
    })
    .await?;
    if let Some(field) = taken {
        return Err(ApiError::Conflict(format!("{field} is already taken")));
    }

    let user = run_db(&state.db, move |db| {
        let password_hash = hash_password(&password)?;
        let id = db.create_identity(&NewIdentity {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            role: role.as_str(),
            phone: phone.as_deref(),
        })?;
        Ok(UserSnapshot {
            id,
            username,
            email,
            role,
            phone,
        })
    })
    .await?;

    info!("Registered {} '{}' (id {})", user.role, user.username, user.id);
    state.bus.publish(&ChangeEvent::Created(user.clone()));

    Ok((StatusCode::CREATED, Json(auth_response(&state, user)?)))
}

pub async fn login(
    State(state): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let username = req.username.trim().to_string();
    let password = req.password;
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::validation("username and password are required"));
    }

    let row = run_db(&state.db, move |db| {
        let row = db.get_identity_by_username(&username)?;
        Ok(row.filter(|r| verify_password(&password, &r.password)))
    })
    .await?
    .ok_or_else(|| ApiError::Unauthenticated("invalid username or password".into()))?;

    let user = row.snapshot().map_err(ApiError::Internal)?;
    Ok(Json(auth_response(&state, user)?))
}

/// Exchange a refresh token for a new access token. The role is re-read from
/// storage so a role change takes effect on the next refresh.
pub async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".into()))?;
    let claims = token::verify(&state.jwt_secret, token, TokenKind::Refresh)?;

    let row = run_db(&state.db, move |db| db.get_identity_by_id(claims.sub))
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("user no longer exists".into()))?;
    let user = row.snapshot().map_err(ApiError::Internal)?;

    let access_token = token::issue(&state.jwt_secret, user.id, user.role, TokenKind::Access)
        .map_err(ApiError::Internal)?;
    Ok(Json(RefreshResponse { access_token }))
}

pub async fn update_identity(
    State(state): State<AuthState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateIdentityRequest>,
) -> Result<Json<UserUpdatedResponse>, ApiError> {
    if claims.sub != id && !claims.is_manager() {
        return Err(ApiError::forbidden("cannot update another user"));
    }

    let current = run_db(&state.db, move |db| db.get_identity_by_id(id))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?
        .snapshot()
        .map_err(ApiError::Internal)?;

    let role = parse_role(req.role.as_deref(), current.role)?;
    if role != current.role && !claims.is_manager() {
        return Err(ApiError::forbidden("only a manager can change roles"));
    }

    let email = match req.email.as_deref().map(str::trim) {
        None => current.email.clone(),
        Some("") => return Err(ApiError::validation("email cannot be blank")),
        Some(email) => email.to_string(),
    };
    let phone = match req.phone.as_deref() {
        None => current.phone.clone(),
        Some(raw) => non_blank(Some(raw)),
    };

    let updated = UserSnapshot {
        id,
        username: current.username,
        email,
        role,
        phone,
    };

    let candidate = updated.clone();
    let found = run_db(&state.db, move |db| {
        if let Some(other) = db.get_identity_by_email(&candidate.email)? {
            if other.id != candidate.id {
                return Ok(Err(ApiError::Conflict("email is already taken".into())));
            }
        }
        let found = db.update_identity(
            candidate.id,
            &candidate.email,
            candidate.role.as_str(),
            candidate.phone.as_deref(),
        )?;
        Ok(Ok(found))
    })
    .await??;
    if !found {
        return Err(ApiError::not_found("user"));
    }

    info!("Updated identity {} (by user {})", id, claims.sub);
    state.bus.publish(&ChangeEvent::Updated(updated.clone()));

    Ok(Json(UserUpdatedResponse {
        msg: "user updated".into(),
        user: updated,
    }))
}

/// Upgrade to the change-event stream consumed by the profile mirror.
pub async fn events_ws(State(state): State<AuthState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let bus = state.bus.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| connection::stream_events(socket, bus, shutdown))
}

/// Seed the configured manager unless one already exists. Safe to call on
/// every startup.
pub async fn bootstrap_manager(
    state: &AuthState,
    manager: &DefaultManager,
) -> Result<Option<UserSnapshot>, ApiError> {
    let manager = manager.clone();
    let seeded = run_db(&state.db, move |db| {
        if db.count_managers()? > 0 {
            return Ok(None);
        }
        let password_hash = hash_password(&manager.password)?;
        let id = db.seed_manager_if_missing(&NewIdentity {
            username: &manager.username,
            email: &manager.email,
            password_hash: &password_hash,
            role: Role::Manager.as_str(),
            phone: None,
        })?;
        Ok(id.map(|id| UserSnapshot {
            id,
            username: manager.username,
            email: manager.email,
            role: Role::Manager,
            phone: None,
        }))
    })
    .await?;

    match &seeded {
        Some(user) => {
            info!("Seeded default manager '{}' (id {})", user.username, user.id);
            state.bus.publish(&ChangeEvent::Created(user.clone()));
        }
        None => info!("Manager account present, skipping bootstrap"),
    }
    Ok(seeded)
}
