//! HTTP handlers for the identity, profile and certificate services.
//!
//! Each service gets its own state type and router builder in [`routes`];
//! the binaries in certwatch-server add CORS and tracing layers on top.

pub mod auth;
pub mod certificates;
pub mod error;
pub mod middleware;
pub mod profiles;
pub mod routes;
pub mod token;
pub mod transfer;

use std::sync::Arc;

use certwatch_db::Database;

use crate::error::ApiError;

/// Run a synchronous storage call on the blocking pool.
pub async fn run_db<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))?
        .map_err(ApiError::from)
}
