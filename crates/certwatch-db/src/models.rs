//! Database row types. These map directly to SQLite rows.
//! Distinct from certwatch-types API models to keep the DB layer independent.

use anyhow::Result;
use chrono::NaiveDate;

use certwatch_types::models::{CertificateView, UserSnapshot, days_left};

pub struct IdentityRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub phone: Option<String>,
    pub created_at: String,
}

impl IdentityRow {
    pub fn snapshot(&self) -> Result<UserSnapshot> {
        Ok(UserSnapshot {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.parse()?,
            phone: self.phone.clone(),
        })
    }
}

pub struct NewIdentity<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub phone: Option<&'a str>,
}

pub struct ProfileRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
}

impl ProfileRow {
    pub fn snapshot(&self) -> Result<UserSnapshot> {
        Ok(UserSnapshot {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.parse()?,
            phone: self.phone.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRow {
    pub id: i64,
    pub name: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub owner_id: i64,
}

impl CertificateRow {
    pub fn view(&self, today: NaiveDate) -> CertificateView {
        CertificateView {
            id: self.id,
            name: self.name.clone(),
            date_start: self.date_start,
            date_end: self.date_end,
            days_left: days_left(self.date_end, today),
            owner_id: self.owner_id,
        }
    }
}

pub struct CertificateFields<'a> {
    pub name: &'a str,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub owner_id: i64,
}
