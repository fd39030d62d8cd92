//! Environment configuration for the four binaries.
//!
//! Every `from_env()` reads process variables (after `dotenvy` has loaded a
//! `.env` file, if any); `from_lookup()` takes any key lookup so the parsing
//! rules can be tested without touching the environment.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;

use certwatch_api::auth::DefaultManager;
use certwatch_notify::mailer::SmtpConfig;
use certwatch_notify::scheduler::{DEFAULT_DAYS, parse_days, parse_time};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "some_default_secret",
];

pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Process environment, with blank values treated as unset.
pub fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(get: Lookup<'_>, key: &str, default: &str) -> String {
    get(key).unwrap_or_else(|| default.to_string())
}

fn parsed<T: FromStr>(get: Lookup<'_>, key: &str, default: T) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value '{raw}'")),
    }
}

/// Settings every service shares.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub jwt_secret: String,
    pub internal_token: Option<String>,
    pub host: String,
}

impl SharedConfig {
    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        let jwt_secret = get("CERTWATCH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!(
                "CERTWATCH_JWT_SECRET is unset or still a placeholder; \
                 set the same random value for every service"
            );
        }

        Ok(Self {
            jwt_secret,
            internal_token: get("CERTWATCH_INTERNAL_TOKEN"),
            host: or_default(get, "CERTWATCH_HOST", "0.0.0.0"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub shared: SharedConfig,
    pub port: u16,
    pub db_path: PathBuf,
    pub default_manager: DefaultManager,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env)
    }

    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        let password = get("CERTWATCH_DEFAULT_MANAGER_PASSWORD")
            .context("CERTWATCH_DEFAULT_MANAGER_PASSWORD must be set to seed the first manager")?;

        Ok(Self {
            shared: SharedConfig::from_lookup(get)?,
            port: parsed(get, "CERTWATCH_AUTH_PORT", 5001)?,
            db_path: or_default(get, "CERTWATCH_AUTH_DB_PATH", "certwatch-auth.db").into(),
            default_manager: DefaultManager {
                username: or_default(get, "CERTWATCH_DEFAULT_MANAGER_USERNAME", "admin"),
                password,
                email: or_default(get, "CERTWATCH_DEFAULT_MANAGER_EMAIL", "admin@example.com"),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct UsersConfig {
    pub shared: SharedConfig,
    pub port: u16,
    pub db_path: PathBuf,
    pub events_url: String,
}

impl UsersConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env)
    }

    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            shared: SharedConfig::from_lookup(get)?,
            port: parsed(get, "CERTWATCH_USERS_PORT", 5002)?,
            db_path: or_default(get, "CERTWATCH_USERS_DB_PATH", "certwatch-users.db").into(),
            events_url: or_default(get, "CERTWATCH_EVENTS_URL", "ws://127.0.0.1:5001/events"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CertsConfig {
    pub shared: SharedConfig,
    pub port: u16,
    pub db_path: PathBuf,
}

impl CertsConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env)
    }

    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            shared: SharedConfig::from_lookup(get)?,
            port: parsed(get, "CERTWATCH_CERTS_PORT", 5003)?,
            db_path: or_default(get, "CERTWATCH_CERTS_DB_PATH", "certwatch-certs.db").into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub shared: SharedConfig,
    pub port: u16,
    pub certs_url: String,
    pub users_url: String,
    pub smtp: SmtpConfig,
    pub sms_api_key: Option<String>,
    pub workers: usize,
    pub notify_at: NaiveTime,
    pub notify_days: Vec<u32>,
}

impl NotifyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env)
    }

    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        let notify_at = match get("CERTWATCH_NOTIFY_AT") {
            None => NaiveTime::default(),
            Some(raw) => parse_time(&raw)
                .with_context(|| format!("CERTWATCH_NOTIFY_AT must be HH:MM, got '{raw}'"))?,
        };
        let notify_days = match get("CERTWATCH_NOTIFY_DAYS") {
            None => DEFAULT_DAYS.to_vec(),
            Some(raw) => parse_days(&raw).with_context(|| {
                format!("CERTWATCH_NOTIFY_DAYS must be a comma-separated list of days, got '{raw}'")
            })?,
        };

        let smtp_user = or_default(get, "CERTWATCH_SMTP_USER", "");
        let smtp = SmtpConfig {
            host: or_default(get, "CERTWATCH_SMTP_HOST", "smtp.gmail.com"),
            port: parsed(get, "CERTWATCH_SMTP_PORT", 587)?,
            password: or_default(get, "CERTWATCH_SMTP_PASS", ""),
            from: get("CERTWATCH_EMAIL_FROM").unwrap_or_else(|| smtp_user.clone()),
            user: smtp_user,
        };
        if smtp.from.is_empty() {
            bail!("CERTWATCH_EMAIL_FROM (or CERTWATCH_SMTP_USER) must be set");
        }

        Ok(Self {
            shared: SharedConfig::from_lookup(get)?,
            port: parsed(get, "CERTWATCH_NOTIFY_PORT", 5004)?,
            certs_url: or_default(get, "CERTWATCH_CERTS_URL", "http://127.0.0.1:5003"),
            users_url: or_default(get, "CERTWATCH_USERS_URL", "http://127.0.0.1:5002"),
            smtp,
            sms_api_key: get("CERTWATCH_SMS_API_KEY"),
            workers: parsed(get, "CERTWATCH_NOTIFY_WORKERS", 4)?,
            notify_at,
            notify_days,
        })
    }
}
