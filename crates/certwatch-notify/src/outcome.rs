use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    /// Profile field the channel delivers to.
    pub fn contact_field(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "phone",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Sms => f.write_str("SMS"),
        }
    }
}

/// Why a notification job stopped early. Never propagated out of a worker:
/// the display text becomes the job's `status_text`.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("cert not found ({0})")]
    CertificateNotFound(i64),

    #[error("user not found ({0})")]
    ProfileNotFound(i64),

    #[error("no {}", .0.contact_field())]
    NoContactInfo(Channel),

    #[error("{0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Ok,
    Error,
}

/// Structured result of one job, in the shape the SMS gateway reports its own
/// results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub status_text: String,
}

impl JobOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Ok,
            status_text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            status_text: text.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == JobStatus::Ok
    }
}

impl From<NotifyError> for JobOutcome {
    fn from(err: NotifyError) -> Self {
        Self::error(err.to_string())
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Ok => "OK",
            JobStatus::Error => "ERROR",
        };
        write!(f, "{}: {}", status, self.status_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_as_status_text() {
        let cases = [
            (NotifyError::CertificateNotFound(7), "cert not found (7)"),
            (NotifyError::ProfileNotFound(3), "user not found (3)"),
            (NotifyError::NoContactInfo(Channel::Email), "no email"),
            (NotifyError::NoContactInfo(Channel::Sms), "no phone"),
        ];
        for (err, text) in cases {
            let outcome = JobOutcome::from(err);
            assert_eq!(outcome.status, JobStatus::Error);
            assert_eq!(outcome.status_text, text);
        }
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_value(JobOutcome::error("no email")).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ERROR", "status_text": "no email" }));

        let parsed: JobOutcome =
            serde_json::from_str(r#"{"status":"OK","status_text":"sent"}"#).unwrap();
        assert!(parsed.is_ok());
    }
}
