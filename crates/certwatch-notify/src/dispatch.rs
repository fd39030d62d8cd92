use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use tracing::{info, warn};

use certwatch_types::models::{CertificateView, UserSnapshot, today};

use crate::directory::Directory;
use crate::mailer::Mailer;
use crate::message::Reminder;
use crate::outcome::{Channel, JobOutcome, NotifyError};
use crate::queue::{Job, JobRunner};
use crate::sms::SmsGateway;

/// Tally of one expiry scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub days: u32,
    pub certificates: usize,
    pub owners: usize,
    pub emails_sent: usize,
    pub sms_sent: usize,
    pub failures: usize,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} certificate(s) expiring in {} day(s), {} owner(s): {} email(s), {} SMS, {} failure(s)",
            self.certificates, self.days, self.owners, self.emails_sent, self.sms_sent, self.failures
        )
    }
}

impl From<ScanSummary> for JobOutcome {
    fn from(summary: ScanSummary) -> Self {
        if summary.failures == 0 {
            JobOutcome::ok(summary.to_string())
        } else {
            JobOutcome::error(summary.to_string())
        }
    }
}

/// Resolves certificates and their owners, then delivers reminders.
pub struct Notifier<D, M, S> {
    directory: D,
    mailer: M,
    sms: S,
}

impl<D, M, S> Notifier<D, M, S>
where
    D: Directory,
    M: Mailer,
    S: SmsGateway,
{
    pub fn new(directory: D, mailer: M, sms: S) -> Self {
        Self {
            directory,
            mailer,
            sms,
        }
    }

    async fn resolve(&self, cert_id: i64) -> Result<(CertificateView, UserSnapshot), NotifyError> {
        let certificate = self
            .directory
            .certificate(cert_id)
            .await
            .ok_or(NotifyError::CertificateNotFound(cert_id))?;
        let owner = self
            .directory
            .profile(certificate.owner_id)
            .await
            .ok_or(NotifyError::ProfileNotFound(certificate.owner_id))?;
        Ok((certificate, owner))
    }

    async fn deliver(
        &self,
        channel: Channel,
        reminder: &Reminder,
        owner: &UserSnapshot,
    ) -> Result<JobOutcome, NotifyError> {
        match channel {
            Channel::Email => {
                let email = owner.email.trim();
                if email.is_empty() {
                    return Err(NotifyError::NoContactInfo(Channel::Email));
                }
                self.mailer
                    .send(email, &reminder.subject(), &reminder.email_body())
                    .await?;
                Ok(JobOutcome::ok(format!("email sent to {email}")))
            }
            Channel::Sms => {
                let phone = owner
                    .phone
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or(NotifyError::NoContactInfo(Channel::Sms))?;
                Ok(self.sms.send(phone, &reminder.sms_text()).await)
            }
        }
    }

    /// Notify the owner of one certificate over `channel`. Every abort is
    /// logged and returned as an error outcome.
    pub async fn notify_certificate(&self, cert_id: i64, channel: Channel, today: NaiveDate) -> JobOutcome {
        let result = async {
            let (certificate, owner) = self.resolve(cert_id).await?;
            let reminder = Reminder::new(&certificate, &owner, today);
            self.deliver(channel, &reminder, &owner).await
        }
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} notification for certificate {} aborted: {}", channel, cert_id, e);
                e.into()
            }
        }
    }

    /// Remind every owner with a certificate ending exactly `days` days from
    /// `today`. Each owner is contacted once per scan, by email and by SMS
    /// independently.
    pub async fn scan_expiring(&self, days: u32, today: NaiveDate) -> ScanSummary {
        let certificates = self.directory.expiring(days).await;
        let mut summary = ScanSummary {
            days,
            certificates: certificates.len(),
            ..Default::default()
        };

        let mut notified = HashSet::new();
        for certificate in &certificates {
            if !notified.insert(certificate.owner_id) {
                continue;
            }
            summary.owners += 1;

            let Some(owner) = self.directory.profile(certificate.owner_id).await else {
                warn!("Expiry scan: {}", NotifyError::ProfileNotFound(certificate.owner_id));
                summary.failures += 1;
                continue;
            };
            let reminder = Reminder::new(certificate, &owner, today);

            for channel in [Channel::Email, Channel::Sms] {
                match self.deliver(channel, &reminder, &owner).await {
                    Ok(outcome) if outcome.is_ok() => match channel {
                        Channel::Email => summary.emails_sent += 1,
                        Channel::Sms => summary.sms_sent += 1,
                    },
                    Ok(outcome) => {
                        warn!("Expiry scan: {} to user {} failed: {}", channel, owner.id, outcome.status_text);
                        summary.failures += 1;
                    }
                    Err(NotifyError::NoContactInfo(_)) => {
                        info!("Expiry scan: user {} has no {}, skipping", owner.id, channel.contact_field());
                    }
                    Err(e) => {
                        warn!("Expiry scan: {} to user {} failed: {}", channel, owner.id, e);
                        summary.failures += 1;
                    }
                }
            }
        }

        info!("Expiry scan finished: {}", summary);
        summary
    }
}

impl<D, M, S> JobRunner for Notifier<D, M, S>
where
    D: Directory,
    M: Mailer,
    S: SmsGateway,
{
    async fn run(&self, job: Job) -> JobOutcome {
        let today = today();
        match job {
            Job::CertificateEmail(id) => self.notify_certificate(id, Channel::Email, today).await,
            Job::CertificateSms(id) => self.notify_certificate(id, Channel::Sms, today).await,
            Job::ExpiringScan(days) => self.scan_expiring(days, today).await.into(),
        }
    }
}
