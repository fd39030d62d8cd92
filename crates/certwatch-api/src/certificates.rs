use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use tracing::info;

use certwatch_db::Database;
use certwatch_db::models::{CertificateFields, CertificateRow};
use certwatch_types::api::{
    CertificateList, Claims, CreateCertificateRequest, MessageResponse, UpdateCertificateRequest,
};
use certwatch_types::models::{CertificateView, date_in_days, parse_date, today};

use crate::error::ApiError;
use crate::middleware::{InternalToken, JwtSecret, ensure_manager};
use crate::run_db;

pub type CertState = Arc<CertStateInner>;

pub struct CertStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: JwtSecret,
    pub internal_token: InternalToken,
}

/// A validated certificate ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDraft {
    pub name: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub owner_id: i64,
}

impl CertificateDraft {
    pub fn fields(&self) -> CertificateFields<'_> {
        CertificateFields {
            name: &self.name,
            date_start: self.date_start,
            date_end: self.date_end,
            owner_id: self.owner_id,
        }
    }
}

fn date_field(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    parse_date(raw)
        .ok_or_else(|| ApiError::validation(format!("{field} must be a date in YYYY-MM-DD format")))
}

fn check_window(date_start: NaiveDate, date_end: NaiveDate) -> Result<(), ApiError> {
    if date_end < date_start {
        return Err(ApiError::validation("date_end must not be before date_start"));
    }
    Ok(())
}

/// Validate a create request. `default_owner` is used when the request names
/// no owner.
pub fn validate_new(
    req: &CreateCertificateRequest,
    default_owner: i64,
) -> Result<CertificateDraft, ApiError> {
    let name = req.name.trim();
    if name.is_empty() || req.date_start.trim().is_empty() || req.date_end.trim().is_empty() {
        return Err(ApiError::validation("name, date_start and date_end are required"));
    }

    let date_start = date_field("date_start", &req.date_start)?;
    let date_end = date_field("date_end", &req.date_end)?;
    check_window(date_start, date_end)?;

    Ok(CertificateDraft {
        name: name.to_string(),
        date_start,
        date_end,
        owner_id: req.owner_id.unwrap_or(default_owner),
    })
}

/// Apply a partial update on top of `existing`. The date window is checked
/// on the merged result, so moving only one end is validated too.
pub fn merge_update(
    existing: &CertificateRow,
    req: &UpdateCertificateRequest,
) -> Result<CertificateDraft, ApiError> {
    let name = match req.name.as_deref().map(str::trim) {
        None => existing.name.clone(),
        Some("") => return Err(ApiError::validation("name cannot be blank")),
        Some(name) => name.to_string(),
    };
    let date_start = match req.date_start.as_deref() {
        Some(raw) => date_field("date_start", raw)?,
        None => existing.date_start,
    };
    let date_end = match req.date_end.as_deref() {
        Some(raw) => date_field("date_end", raw)?,
        None => existing.date_end,
    };
    check_window(date_start, date_end)?;

    Ok(CertificateDraft {
        name,
        date_start,
        date_end,
        owner_id: req.owner_id.unwrap_or(existing.owner_id),
    })
}

/// Certificates the caller may see: everything for managers, own otherwise.
pub(crate) async fn visible_to(
    state: &CertState,
    claims: &Claims,
) -> Result<Vec<CertificateRow>, ApiError> {
    if claims.is_manager() {
        run_db(&state.db, |db| db.list_certificates()).await
    } else {
        let owner = claims.sub;
        run_db(&state.db, move |db| db.list_certificates_by_owner(owner)).await
    }
}

async fn load(state: &CertState, id: i64) -> Result<CertificateRow, ApiError> {
    run_db(&state.db, move |db| db.get_certificate(id))
        .await?
        .ok_or_else(|| ApiError::not_found("certificate"))
}

pub(crate) async fn insert(state: &CertState, draft: CertificateDraft) -> Result<CertificateRow, ApiError> {
    run_db(&state.db, move |db| db.insert_certificate(&draft.fields())).await
}

pub async fn list_certificates(
    State(state): State<CertState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CertificateList>, ApiError> {
    let today = today();
    let certificates = visible_to(&state, &claims)
        .await?
        .iter()
        .map(|row| row.view(today))
        .collect();
    Ok(Json(CertificateList { certificates }))
}

pub async fn get_certificate(
    State(state): State<CertState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CertificateView>, ApiError> {
    let row = load(&state, id).await?;
    if !claims.is_manager() && row.owner_id != claims.sub {
        return Err(ApiError::forbidden("access denied"));
    }
    Ok(Json(row.view(today())))
}

/// Internal read: no caller identity and no ownership check.
pub async fn get_certificate_public(
    State(state): State<CertState>,
    Path(id): Path<i64>,
) -> Result<Json<CertificateView>, ApiError> {
    Ok(Json(load(&state, id).await?.view(today())))
}

/// Certificates whose `date_end` is exactly `days` days from today.
pub async fn list_expiring(
    State(state): State<CertState>,
    Path(days): Path<u32>,
) -> Result<Json<CertificateList>, ApiError> {
    let today = today();
    let target =
        date_in_days(today, days).ok_or_else(|| ApiError::validation("days out of range"))?;
    let rows = run_db(&state.db, move |db| db.certificates_ending_on(target)).await?;
    Ok(Json(CertificateList {
        certificates: rows.iter().map(|row| row.view(today)).collect(),
    }))
}

pub async fn create_certificate(
    State(state): State<CertState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCertificateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_manager(&claims)?;

    let draft = validate_new(&req, claims.sub)?;
    let row = insert(&state, draft).await?;

    info!("Manager {} created certificate {} for owner {}", claims.sub, row.id, row.owner_id);
    Ok((StatusCode::CREATED, Json(row.view(today()))))
}

pub async fn update_certificate(
    State(state): State<CertState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateCertificateRequest>,
) -> Result<Json<CertificateView>, ApiError> {
    ensure_manager(&claims)?;

    let existing = load(&state, id).await?;
    let draft = merge_update(&existing, &req)?;

    let updated = draft.clone();
    if !run_db(&state.db, move |db| db.update_certificate(id, &updated.fields())).await? {
        return Err(ApiError::not_found("certificate"));
    }

    info!("Manager {} updated certificate {}", claims.sub, id);
    let row = CertificateRow {
        id,
        name: draft.name,
        date_start: draft.date_start,
        date_end: draft.date_end,
        owner_id: draft.owner_id,
    };
    Ok(Json(row.view(today())))
}

pub async fn delete_certificate(
    State(state): State<CertState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    ensure_manager(&claims)?;

    if !run_db(&state.db, move |db| db.delete_certificate(id)).await? {
        return Err(ApiError::not_found("certificate"));
    }

    info!("Manager {} deleted certificate {}", claims.sub, id);
    Ok(Json(MessageResponse::new("certificate deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &str, start: &str, end: &str) -> CreateCertificateRequest {
        CreateCertificateRequest {
            name: name.into(),
            date_start: start.into(),
            date_end: end.into(),
            owner_id: None,
        }
    }

    fn existing() -> CertificateRow {
        CertificateRow {
            id: 1,
            name: "TLS".into(),
            date_start: parse_date("2025-01-01").unwrap(),
            date_end: parse_date("2025-06-01").unwrap(),
            owner_id: 7,
        }
    }

    #[test]
    fn new_certificate_defaults_owner_to_caller() {
        let draft = validate_new(&create(" TLS ", "2025-01-01", "2025-01-01"), 9).unwrap();
        assert_eq!(draft.name, "TLS");
        assert_eq!(draft.owner_id, 9);
        assert_eq!(draft.date_start, draft.date_end);
    }

    #[test]
    fn new_certificate_rejects_bad_input() {
        for req in [
            create("", "2025-01-01", "2025-02-01"),
            create("TLS", "01/01/2025", "2025-02-01"),
            create("TLS", "2025-01-01", ""),
            create("TLS", "2025-02-01", "2025-01-31"),
        ] {
            let err = validate_new(&req, 1).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{req:?}");
        }
    }

    #[test]
    fn update_checks_merged_window() {
        let req = UpdateCertificateRequest {
            date_end: Some("2024-12-31".into()),
            ..Default::default()
        };
        assert!(matches!(merge_update(&existing(), &req), Err(ApiError::Validation(_))));

        let req = UpdateCertificateRequest {
            date_start: Some("2025-03-01".into()),
            owner_id: Some(8),
            ..Default::default()
        };
        let draft = merge_update(&existing(), &req).unwrap();
        assert_eq!(draft.name, "TLS");
        assert_eq!(draft.owner_id, 8);
        assert_eq!(draft.date_end, existing().date_end);
    }
}
