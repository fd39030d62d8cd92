use std::sync::Arc;

use certwatch_api::certificates::CertStateInner;
use certwatch_api::middleware::{InternalToken, JwtSecret};
use certwatch_api::routes::certificate_router;
use certwatch_db::{Database, Schema};
use certwatch_server::config::CertsConfig;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    certwatch_server::init_tracing();

    let config = CertsConfig::from_env()?;
    if config.shared.internal_token.is_none() {
        warn!("CERTWATCH_INTERNAL_TOKEN is unset; internal certificate reads are open to anyone");
    }

    let db = Arc::new(Database::open(&config.db_path, Schema::Certificates)?);
    let state = Arc::new(CertStateInner {
        db,
        jwt_secret: JwtSecret::new(config.shared.jwt_secret.as_str()),
        internal_token: InternalToken::new(config.shared.internal_token.clone()),
    });

    let shutdown = certwatch_server::shutdown_token();
    certwatch_server::serve(
        "certs",
        certificate_router(state),
        &config.shared.host,
        config.port,
        shutdown,
    )
    .await
}
