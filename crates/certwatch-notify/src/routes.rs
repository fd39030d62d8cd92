use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use certwatch_api::error::ApiError;
use certwatch_api::middleware::{JwtSecret, ensure_manager, require_auth};
use certwatch_api::routes::health;
use certwatch_types::api::Claims;
use certwatch_types::models::{date_in_days, today};

use crate::queue::{Job, JobQueue};

pub type NotifyState = Arc<NotifyStateInner>;

pub struct NotifyStateInner {
    pub queue: JobQueue,
    pub jwt_secret: JwtSecret,
}

/// Acknowledgment returned as soon as a job is queued.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub msg: String,
    pub job_id: Uuid,
}

fn enqueue(
    state: &NotifyState,
    job: Job,
    msg: String,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let job_id = state
        .queue
        .enqueue(job)
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { msg, job_id })))
}

pub async fn notify_certificate(
    State(state): State<NotifyState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    enqueue(
        &state,
        Job::CertificateEmail(id),
        format!("email notification for certificate {id} queued"),
    )
}

pub async fn notify_sms(
    State(state): State<NotifyState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    enqueue(
        &state,
        Job::CertificateSms(id),
        format!("SMS notification for certificate {id} queued"),
    )
}

/// Manual trigger of the scheduled scan.
pub async fn notify_expiring(
    State(state): State<NotifyState>,
    Path(days): Path<u32>,
    Extension(claims): Extension<Claims>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    ensure_manager(&claims)?;
    if date_in_days(today(), days).is_none() {
        return Err(ApiError::validation("days out of range"));
    }
    enqueue(
        &state,
        Job::ExpiringScan(days),
        format!("expiry scan for {days} day(s) queued"),
    )
}

pub fn notify_router(state: NotifyState) -> Router {
    let public: Router<NotifyState> = Router::new().route("/health", get(health));

    let protected: Router<NotifyState> = Router::new()
        .route("/notify/certificate/{id}", post(notify_certificate))
        .route("/notify/sms/{id}", post(notify_sms))
        .route("/notify/expiring/{days}", post(notify_expiring))
        .route_layer(from_fn_with_state(state.jwt_secret.clone(), require_auth));

    Router::new().merge(public).merge(protected).with_state(state)
}
