use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Calendar-date text format used on the wire and in import files.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "manager" => Ok(Self::Manager),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Public view of an identity. Doubles as the change-event payload and the
/// profile mirror's record shape, so the three never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateView {
    pub id: i64,
    pub name: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub days_left: i64,
    pub owner_id: i64,
}

/// Today's date in UTC. Every expiry computation goes through this so the
/// registry and the dispatcher agree on what "today" is.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// The date `days` days after `today`, or `None` past the calendar's range.
pub fn date_in_days(today: NaiveDate, days: u32) -> Option<NaiveDate> {
    today.checked_add_days(Days::new(u64::from(days)))
}

/// Whole days from `today` until `date_end`, never negative.
pub fn days_left(date_end: NaiveDate, today: NaiveDate) -> i64 {
    (date_end - today).num_days().max(0)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Trim a free-form optional field, collapsing blanks to `None`.
pub fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
