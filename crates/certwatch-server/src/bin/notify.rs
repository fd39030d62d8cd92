use std::sync::Arc;

use certwatch_api::middleware::JwtSecret;
use certwatch_notify::directory::HttpDirectory;
use certwatch_notify::dispatch::Notifier;
use certwatch_notify::mailer::SmtpMailer;
use certwatch_notify::queue::{JobQueue, spawn_workers};
use certwatch_notify::routes::{NotifyStateInner, notify_router};
use certwatch_notify::scheduler;
use certwatch_notify::sms::SmsRu;
use certwatch_server::config::NotifyConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    certwatch_server::init_tracing();

    let config = NotifyConfig::from_env()?;
    if config.sms_api_key.is_none() {
        warn!("CERTWATCH_SMS_API_KEY is unset; SMS jobs will fail");
    }

    let notifier = Arc::new(Notifier::new(
        HttpDirectory::new(
            &config.certs_url,
            &config.users_url,
            config.shared.internal_token.clone(),
        )?,
        SmtpMailer::new(&config.smtp)?,
        SmsRu::new(config.sms_api_key.clone())?,
    ));

    let shutdown = certwatch_server::shutdown_token();
    let (queue, jobs) = JobQueue::new();
    let workers = spawn_workers(config.workers, notifier, jobs, shutdown.clone());
    info!("Started {} notification worker(s)", workers.len());

    let scheduler_task = tokio::spawn(scheduler::run_daily(
        queue.clone(),
        config.notify_at,
        config.notify_days.clone(),
        shutdown.clone(),
    ));
    info!(
        "Expiry scans for {:?} day(s) scheduled daily at {} UTC",
        config.notify_days, config.notify_at
    );

    let state = Arc::new(NotifyStateInner {
        queue,
        jwt_secret: JwtSecret::new(config.shared.jwt_secret.as_str()),
    });

    let served = certwatch_server::serve(
        "notify",
        notify_router(state),
        &config.shared.host,
        config.port,
        shutdown.clone(),
    )
    .await;

    // Workers finish the job in hand, then exit
    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Notification worker ended abnormally: {}", e);
        }
    }
    served
}
