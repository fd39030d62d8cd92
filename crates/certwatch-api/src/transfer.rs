//! CSV bulk import and export of certificates.
//!
//! Export writes the columns `name`, `date_start`, `date_end`. Import also
//! accepts the short forms `start`/`end` and the Russian headers of legacy
//! spreadsheets. Each imported row is created independently: a bad row is
//! reported and skipped, never aborting the rest of the file.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use certwatch_db::models::CertificateRow;
use certwatch_types::api::{Claims, CreateCertificateRequest, ImportReport, ImportedRow};
use certwatch_types::models::DATE_FORMAT;

use crate::certificates::{self, CertState};
use crate::error::ApiError;
use crate::middleware::ensure_manager;

pub const EXPORT_FILENAME: &str = "certificates_export.csv";

const COLUMNS: [&str; 3] = ["name", "date_start", "date_end"];

/// Header spellings accepted on import, per column of [`COLUMNS`].
const COLUMN_ALIASES: [&[&str]; 3] = [
    &["name", "Проверка"],
    &["date_start", "start", "Начало действия"],
    &["date_end", "end", "Конец действия"],
];

/// One data row of an import file, numbered the way a spreadsheet shows it
/// (the header is row 1).
#[derive(Debug)]
pub struct ImportRow {
    pub row: usize,
    pub request: CreateCertificateRequest,
}

/// Split an upload into per-row requests. Fails as a whole only when the
/// header is unreadable or lacks a required column.
pub fn parse_import(body: &[u8]) -> Result<Vec<Result<ImportRow, String>>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| ApiError::validation(format!("unreadable CSV header: {e}")))?
        .clone();

    let mut index = [0usize; 3];
    let mut missing = Vec::new();
    for ((slot, column), aliases) in index.iter_mut().zip(COLUMNS).zip(COLUMN_ALIASES) {
        let found = headers
            .iter()
            .position(|h| aliases.iter().any(|alias| h.to_lowercase() == alias.to_lowercase()));
        match found {
            Some(i) => *slot = i,
            None => missing.push(column),
        }
    }
    if !missing.is_empty() {
        return Err(ApiError::validation(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let rows = reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let row = i + 2;
            let record = record.map_err(|e| format!("row {row}: {e}"))?;
            let field = |n: usize| record.get(index[n]).unwrap_or_default().to_string();
            Ok(ImportRow {
                row,
                request: CreateCertificateRequest {
                    name: field(0),
                    date_start: field(1),
                    date_end: field(2),
                    owner_id: None,
                },
            })
        })
        .collect();

    Ok(rows)
}

pub fn render_export(rows: &[CertificateRow]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.name.clone(),
            row.date_start.format(DATE_FORMAT).to_string(),
            row.date_end.format(DATE_FORMAT).to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV export failed: {e}"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportParams {
    pub owner_id: Option<i64>,
}

/// `POST /certificates/import` with the CSV file as the request body.
pub async fn import_certificates(
    State(state): State<CertState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> Result<Json<ImportReport>, ApiError> {
    ensure_manager(&claims)?;
    if body.is_empty() {
        return Err(ApiError::validation("import file is empty"));
    }

    let owner_id = params.owner_id.unwrap_or(claims.sub);
    let mut report = ImportReport::default();

    for parsed in parse_import(&body)? {
        let ImportRow { row, request } = match parsed {
            Ok(parsed) => parsed,
            Err(msg) => {
                report.errors.push(msg);
                continue;
            }
        };

        let draft = match certificates::validate_new(&request, owner_id) {
            Ok(draft) => draft,
            Err(e) => {
                report.errors.push(format!("row {row}: {e}"));
                continue;
            }
        };

        match certificates::insert(&state, draft).await {
            Ok(created) => report.created.push(ImportedRow {
                row,
                id: created.id,
                name: created.name,
            }),
            Err(e) => {
                warn!("Import row {} failed to store: {}", row, e);
                report.errors.push(format!("row {row}: could not be stored"));
            }
        }
    }

    info!(
        "Manager {} imported {} certificate(s) for owner {}, {} row(s) rejected",
        claims.sub,
        report.created.len(),
        owner_id,
        report.errors.len()
    );
    Ok(Json(report))
}

/// `GET /certificates/export`: the caller-visible list as a CSV download.
pub async fn export_certificates(
    State(state): State<CertState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = certificates::visible_to(&state, &claims).await?;
    let body = render_export(&rows).map_err(ApiError::Internal)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    ))
}
