use std::sync::Arc;

use certwatch_api::auth::{self, AuthState, AuthStateInner};
use certwatch_api::middleware::{InternalToken, JwtSecret};
use certwatch_api::routes::auth_router;
use certwatch_db::{Database, Schema};
use certwatch_gateway::dispatcher::EventBus;
use certwatch_server::config::AuthConfig;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();
    certwatch_server::init_tracing();

    let config = AuthConfig::from_env()?;
    if config.shared.internal_token.is_none() {
        warn!("CERTWATCH_INTERNAL_TOKEN is unset; the event stream is open to anyone");
    }

    let db = Arc::new(Database::open(&config.db_path, Schema::Identity)?);
    let shutdown = certwatch_server::shutdown_token();
    let state: AuthState = Arc::new(AuthStateInner {
        db,
        bus: EventBus::new(),
        jwt_secret: JwtSecret::new(config.shared.jwt_secret.as_str()),
        internal_token: InternalToken::new(config.shared.internal_token.clone()),
        shutdown: shutdown.clone(),
    });

    auth::bootstrap_manager(&state, &config.default_manager)
        .await
        .map_err(|e| anyhow::anyhow!("manager bootstrap failed: {e}"))?;

    certwatch_server::serve(
        "auth",
        auth_router(state),
        &config.shared.host,
        config.port,
        shutdown,
    )
    .await
}
