use chrono::NaiveDate;

use certwatch_types::models::{CertificateView, DATE_FORMAT, UserSnapshot, days_left};

/// Text of one expiry reminder. `days_left` is computed from the caller's
/// `today`, not taken from the certificate service's view.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub username: String,
    pub certificate_id: i64,
    pub certificate_name: String,
    pub date_end: NaiveDate,
    pub days_left: i64,
}

impl Reminder {
    pub fn new(certificate: &CertificateView, owner: &UserSnapshot, today: NaiveDate) -> Self {
        Self {
            username: owner.username.clone(),
            certificate_id: certificate.id,
            certificate_name: certificate.name.clone(),
            date_end: certificate.date_end,
            days_left: days_left(certificate.date_end, today),
        }
    }

    fn expires(&self) -> String {
        self.date_end.format(DATE_FORMAT).to_string()
    }

    pub fn subject(&self) -> String {
        format!(
            "Reminder: certificate '{}' expires in {} day(s)",
            self.certificate_name, self.days_left
        )
    }

    pub fn email_body(&self) -> String {
        format!(
            "Hello, {}!\n\n\
             Certificate \"{}\" (ID {}) expires on {} ({} day(s) left).\n\
             Please renew it in advance.\n\n\
             Certificate management service",
            self.username,
            self.certificate_name,
            self.certificate_id,
            self.expires(),
            self.days_left
        )
    }

    pub fn sms_text(&self) -> String {
        format!(
            "Hello, {}! Certificate \"{}\" expires in {} day(s) ({}).",
            self.username,
            self.certificate_name,
            self.days_left,
            self.expires()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwatch_types::models::{Role, parse_date};

    #[test]
    fn reminder_recomputes_days_left_from_today() {
        let cert = CertificateView {
            id: 12,
            name: "api.example.com".into(),
            date_start: parse_date("2025-01-01").unwrap(),
            date_end: parse_date("2025-03-31").unwrap(),
            days_left: 999,
            owner_id: 4,
        };
        let owner = UserSnapshot {
            id: 4,
            username: "hana".into(),
            email: "hana@x.io".into(),
            role: Role::User,
            phone: None,
        };

        let reminder = Reminder::new(&cert, &owner, parse_date("2025-03-01").unwrap());
        assert_eq!(reminder.days_left, 30);
        assert!(reminder.subject().contains("'api.example.com' expires in 30 day(s)"));
        assert!(reminder.email_body().starts_with("Hello, hana!"));
        assert!(reminder.email_body().contains("(ID 12) expires on 2025-03-31"));
        assert!(reminder.sms_text().contains("(2025-03-31)"));
    }
}
