use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use certwatch_db::Database;
use certwatch_db::models::ProfileRow;
use certwatch_types::api::{
    Claims, CreateProfileRequest, MessageResponse, UpdateProfileRequest, UserList,
};
use certwatch_types::models::{Role, UserSnapshot, non_blank};

use crate::auth::parse_role;
use crate::error::ApiError;
use crate::middleware::{InternalToken, JwtSecret, ensure_manager};
use crate::run_db;

pub type ProfileState = Arc<ProfileStateInner>;

pub struct ProfileStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: JwtSecret,
    pub internal_token: InternalToken,
}

fn to_snapshot(row: ProfileRow) -> Result<UserSnapshot, ApiError> {
    row.snapshot().map_err(ApiError::Internal)
}

async fn load(state: &ProfileState, id: i64) -> Result<UserSnapshot, ApiError> {
    let row = run_db(&state.db, move |db| db.get_profile(id))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    to_snapshot(row)
}

/// Reject `user` if another profile already holds its username or email.
async fn check_unique(state: &ProfileState, user: &UserSnapshot) -> Result<(), ApiError> {
    let (username, email, id) = (user.username.clone(), user.email.clone(), user.id);
    let conflict = run_db(&state.db, move |db| db.profile_conflict(&username, &email, id)).await?;
    match conflict {
        Some(field) => Err(ApiError::Conflict(format!("{field} is already taken"))),
        None => Ok(()),
    }
}

pub async fn list_users(State(state): State<ProfileState>) -> Result<Json<UserList>, ApiError> {
    let rows = run_db(&state.db, |db| db.list_profiles()).await?;
    let users = rows.into_iter().map(to_snapshot).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(UserList { users }))
}

pub async fn get_user(
    State(state): State<ProfileState>,
    Path(id): Path<i64>,
) -> Result<Json<UserSnapshot>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

/// Internal read used by the notification service.
pub async fn get_user_public(
    State(state): State<ProfileState>,
    Path(id): Path<i64>,
) -> Result<Json<UserSnapshot>, ApiError> {
    Ok(Json(load(&state, id).await?))
}

/// Administrative create. The id must be the identity's id: the mirror never
/// assigns its own, and the next change event for that id overwrites this
/// record.
pub async fn create_user(
    State(state): State<ProfileState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_manager(&claims)?;

    let id = match req.id {
        Some(id) if id > 0 => id,
        _ => return Err(ApiError::validation("a positive identity id is required")),
    };
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    if username.is_empty() || email.is_empty() {
        return Err(ApiError::validation("username and email are required"));
    }

    let user = UserSnapshot {
        id,
        username,
        email,
        role: parse_role(req.role.as_deref(), Role::User)?,
        phone: non_blank(req.phone.as_deref()),
    };

    if run_db(&state.db, move |db| db.get_profile(id)).await?.is_some() {
        return Err(ApiError::Conflict(format!("user {id} already exists")));
    }
    check_unique(&state, &user).await?;

    let record = user.clone();
    run_db(&state.db, move |db| db.insert_profile(&record)).await?;

    info!("Manager {} created profile {}", claims.sub, id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<ProfileState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserSnapshot>, ApiError> {
    ensure_manager(&claims)?;

    let current = load(&state, id).await?;

    let username = non_blank(req.username.as_deref()).unwrap_or(current.username);
    let email = non_blank(req.email.as_deref()).unwrap_or(current.email);
    let phone = match req.phone.as_deref() {
        None => current.phone,
        Some(raw) => non_blank(Some(raw)),
    };
    let user = UserSnapshot {
        id,
        username,
        email,
        role: parse_role(req.role.as_deref(), current.role)?,
        phone,
    };
    check_unique(&state, &user).await?;

    let record = user.clone();
    if !run_db(&state.db, move |db| db.update_profile(&record)).await? {
        return Err(ApiError::not_found("user"));
    }

    info!("Manager {} updated profile {}", claims.sub, id);
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<ProfileState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_manager(&claims)?;

    if !run_db(&state.db, move |db| db.delete_profile(id)).await? {
        return Err(ApiError::not_found("user"));
    }

    info!("Manager {} deleted profile {}", claims.sub, id);
    Ok(Json(MessageResponse::new("user deleted")))
}
