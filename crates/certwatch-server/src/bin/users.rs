use std::sync::Arc;

use certwatch_api::middleware::{InternalToken, JwtSecret};
use certwatch_api::profiles::ProfileStateInner;
use certwatch_api::routes::profile_router;
use certwatch_db::{Database, Schema};
use certwatch_gateway::subscriber;
use certwatch_server::config::UsersConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    certwatch_server::init_tracing();

    let config = UsersConfig::from_env()?;
    if config.shared.internal_token.is_none() {
        warn!("CERTWATCH_INTERNAL_TOKEN is unset; /users/public is open to anyone");
    }

    let db = Arc::new(Database::open(&config.db_path, Schema::Profiles)?);
    let shutdown = certwatch_server::shutdown_token();

    // Mirror subscriber, one per process
    let mirror = tokio::spawn(subscriber::run_remote(
        db.clone(),
        config.events_url.clone(),
        config.shared.internal_token.clone(),
        subscriber::RECONNECT_DELAY,
        shutdown.clone(),
    ));

    let state = Arc::new(ProfileStateInner {
        db,
        jwt_secret: JwtSecret::new(config.shared.jwt_secret.as_str()),
        internal_token: InternalToken::new(config.shared.internal_token.clone()),
    });

    let served = certwatch_server::serve(
        "users",
        profile_router(state),
        &config.shared.host,
        config.port,
        shutdown.clone(),
    )
    .await;

    // Stop the subscriber even if the server failed to start
    shutdown.cancel();
    if let Err(e) = mirror.await {
        warn!("Profile mirror task ended abnormally: {}", e);
    }
    info!("Profile mirror shut down");
    served
}
