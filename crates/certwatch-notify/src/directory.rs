//! Lookups against the certificate registry and the profile mirror.
//!
//! Every failure mode (timeout, connection error, non-2xx, bad body) is
//! logged and reported as "not found"; callers never see transport errors.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tracing::warn;

use certwatch_types::api::{CertificateList, INTERNAL_TOKEN_HEADER};
use certwatch_types::models::{CertificateView, UserSnapshot};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Directory: Send + Sync {
    fn certificate(&self, id: i64) -> impl Future<Output = Option<CertificateView>> + Send;

    fn profile(&self, id: i64) -> impl Future<Output = Option<UserSnapshot>> + Send;

    /// Certificates ending exactly `days` days from today; empty on failure.
    fn expiring(&self, days: u32) -> impl Future<Output = Vec<CertificateView>> + Send;
}

/// [`Directory`] backed by the internal read endpoints of the other services.
pub struct HttpDirectory {
    client: reqwest::Client,
    certs_url: String,
    users_url: String,
    internal_token: Option<String>,
}

impl HttpDirectory {
    pub fn new(certs_url: &str, users_url: &str, internal_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            certs_url: certs_url.trim_end_matches('/').to_string(),
            users_url: users_url.trim_end_matches('/').to_string(),
            internal_token,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Option<T> {
        let mut request = self.client.get(&url);
        if let Some(token) = &self.internal_token {
            request = request.header(INTERNAL_TOKEN_HEADER, token);
        }

        let response = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                return None;
            }
        };

        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("GET {} returned an unreadable body: {}", url, e);
                None
            }
        }
    }
}

impl Directory for HttpDirectory {
    async fn certificate(&self, id: i64) -> Option<CertificateView> {
        self.get_json(format!("{}/certificates/public/{}", self.certs_url, id))
            .await
    }

    async fn profile(&self, id: i64) -> Option<UserSnapshot> {
        self.get_json(format!("{}/users/public/{}", self.users_url, id))
            .await
    }

    async fn expiring(&self, days: u32) -> Vec<CertificateView> {
        self.get_json::<CertificateList>(format!("{}/certificates/expiring/{}", self.certs_url, days))
            .await
            .map(|list| list.certificates)
            .unwrap_or_default()
    }
}
