use serde::{Deserialize, Serialize};

use crate::models::{CertificateView, Role, UserSnapshot};

/// Header carrying the service-to-service token on internal endpoints.
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

// -- JWT Claims --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims shared by every service that verifies bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub kind: TokenKind,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }
}

// -- Auth --

// Missing fields default to blank so they are reported as validation errors
// rather than body rejections.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateIdentityRequest {
    pub email: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserUpdatedResponse {
    pub msg: String,
    pub user: UserSnapshot,
}

// -- Profiles --

#[derive(Debug, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<UserSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateProfileRequest {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub role: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
}

// -- Certificates --

#[derive(Debug, Serialize, Deserialize)]
pub struct CertificateList {
    pub certificates: Vec<CertificateView>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateCertificateRequest {
    pub name: String,
    pub date_start: String,
    pub date_end: String,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateCertificateRequest {
    pub name: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportedRow {
    pub row: usize,
    pub id: i64,
    pub name: String,
}

/// Result of a bulk import: one entry per created row, one message per
/// rejected row.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: Vec<ImportedRow>,
    pub errors: Vec<String>,
}

// -- Generic --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}
