use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use crate::outcome::JobOutcome;

pub const SMS_RU_API_URL: &str = "https://sms.ru/sms/send";

pub trait SmsGateway: Send + Sync {
    /// Send one text message. The gateway's own verdict is the outcome.
    fn send(&self, phone: &str, text: &str) -> impl Future<Output = JobOutcome> + Send;
}

/// Reply of the sms.ru send endpoint with `json=1`.
#[derive(Debug, Default, Deserialize)]
pub struct SmsRuResponse {
    pub status: String,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub sms: HashMap<String, SmsRuNumber>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SmsRuNumber {
    pub status: String,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub sms_id: Option<String>,
}

/// Fold a gateway reply into a job outcome. A request-level OK can still
/// carry a per-number rejection.
pub fn outcome_from_response(phone: &str, response: &SmsRuResponse) -> JobOutcome {
    if response.status != "OK" {
        let text = response.status_text.clone().unwrap_or_else(|| match response.status_code {
            Some(code) => format!("sms.ru error {code}"),
            None => "sms.ru rejected the request".to_string(),
        });
        return JobOutcome::error(text);
    }

    match response.sms.values().find(|n| n.status != "OK") {
        Some(rejected) => JobOutcome::error(
            rejected
                .status_text
                .clone()
                .unwrap_or_else(|| format!("sms.ru rejected {phone}")),
        ),
        None => {
            let ids: Vec<&str> = response.sms.values().filter_map(|n| n.sms_id.as_deref()).collect();
            if ids.is_empty() {
                JobOutcome::ok(format!("sms sent to {phone}"))
            } else {
                JobOutcome::ok(format!("sms sent to {phone} (id {})", ids.join(", ")))
            }
        }
    }
}

/// [`SmsGateway`] speaking the sms.ru HTTP form protocol.
pub struct SmsRu {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl SmsRu {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_url(SMS_RU_API_URL, api_key)
    }

    pub fn with_url(api_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key,
        })
    }
}

impl SmsGateway for SmsRu {
    async fn send(&self, phone: &str, text: &str) -> JobOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return JobOutcome::error("SMS gateway API key is not configured");
        };

        let form = [("api_id", api_key), ("to", phone), ("msg", text), ("json", "1")];
        let reply = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await;

        let response = match reply {
            Ok(resp) => resp.json::<SmsRuResponse>().await,
            Err(e) => {
                warn!("sms.ru request for {} failed: {}", phone, e);
                return JobOutcome::error(e.to_string());
            }
        };

        match response {
            Ok(body) => outcome_from_response(phone, &body),
            Err(e) => {
                warn!("sms.ru returned an unreadable reply: {}", e);
                JobOutcome::error(e.to_string())
            }
        }
    }
}
