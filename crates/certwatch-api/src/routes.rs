use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::auth::{self, AuthState};
use crate::certificates::{self, CertState};
use crate::middleware::{attach_claims, require_auth, require_internal};
use crate::profiles::{self, ProfileState};
use crate::transfer;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Identity service: registration, login, token refresh, identity updates and
/// the change-event stream.
pub fn auth_router(state: AuthState) -> Router {
    let register: Router<AuthState> = Router::new()
        .route("/auth/register", post(auth::register))
        .route_layer(from_fn_with_state(state.jwt_secret.clone(), attach_claims));

    let public: Router<AuthState> = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/health", get(health));

    let protected: Router<AuthState> = Router::new()
        .route("/auth/update/{id}", put(auth::update_identity))
        .route_layer(from_fn_with_state(state.jwt_secret.clone(), require_auth));

    let internal: Router<AuthState> = Router::new()
        .route("/events", get(auth::events_ws))
        .route_layer(from_fn_with_state(state.internal_token.clone(), require_internal));

    Router::new()
        .merge(register)
        .merge(public)
        .merge(protected)
        .merge(internal)
        .with_state(state)
}

/// Profile mirror: public reads plus the manager-only administrative path.
pub fn profile_router(state: ProfileState) -> Router {
    let public: Router<ProfileState> = Router::new()
        .route("/users", get(profiles::list_users))
        .route("/users/{id}", get(profiles::get_user))
        .route("/health", get(health));

    let protected: Router<ProfileState> = Router::new()
        .route("/users", post(profiles::create_user))
        .route(
            "/users/{id}",
            put(profiles::update_user).delete(profiles::delete_user),
        )
        .route_layer(from_fn_with_state(state.jwt_secret.clone(), require_auth));

    let internal: Router<ProfileState> = Router::new()
        .route("/users/public/{id}", get(profiles::get_user_public))
        .route_layer(from_fn_with_state(state.internal_token.clone(), require_internal));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(internal)
        .with_state(state)
}

/// Certificate registry.
pub fn certificate_router(state: CertState) -> Router {
    let public: Router<CertState> = Router::new().route("/health", get(health));

    let protected: Router<CertState> = Router::new()
        .route(
            "/certificates",
            get(certificates::list_certificates).post(certificates::create_certificate),
        )
        .route("/certificates/export", get(transfer::export_certificates))
        .route("/certificates/import", post(transfer::import_certificates))
        .route(
            "/certificates/{id}",
            get(certificates::get_certificate)
                .put(certificates::update_certificate)
                .delete(certificates::delete_certificate),
        )
        .route_layer(from_fn_with_state(state.jwt_secret.clone(), require_auth));

    let internal: Router<CertState> = Router::new()
        .route("/certificates/public/{id}", get(certificates::get_certificate_public))
        .route("/certificates/expiring/{days}", get(certificates::list_expiring))
        .route_layer(from_fn_with_state(state.internal_token.clone(), require_internal));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(internal)
        .with_state(state)
}
