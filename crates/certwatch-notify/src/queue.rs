use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::outcome::JobOutcome;

/// A unit of deferred notification work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    CertificateEmail(i64),
    CertificateSms(i64),
    ExpiringScan(u32),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertificateEmail(id) => write!(f, "email for certificate {id}"),
            Self::CertificateSms(id) => write!(f, "SMS for certificate {id}"),
            Self::ExpiringScan(days) => write!(f, "expiry scan for {days} day(s)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: Job,
}

pub trait JobRunner: Send + Sync {
    fn run(&self, job: Job) -> impl Future<Output = JobOutcome> + Send;
}

#[derive(Debug, Error)]
#[error("notification queue is closed")]
pub struct QueueClosed;

pub type JobReceiver = mpsc::UnboundedReceiver<QueuedJob>;

/// Producer side of the job queue. Enqueueing never blocks.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl JobQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: Job) -> Result<Uuid, QueueClosed> {
        let id = Uuid::new_v4();
        self.tx.send(QueuedJob { id, job }).map_err(|_| QueueClosed)?;
        info!("Queued job {} ({})", id, job);
        Ok(id)
    }
}

/// Start `count` workers draining `jobs`. Each job runs once; failures are
/// logged with the job id and never retried. Cancelling `shutdown` stops
/// workers between jobs, never mid-job.
pub fn spawn_workers<R>(
    count: usize,
    runner: Arc<R>,
    jobs: JobReceiver,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    R: JobRunner + 'static,
{
    let jobs = Arc::new(Mutex::new(jobs));
    (0..count.max(1))
        .map(|worker| {
            let runner = runner.clone();
            let jobs = jobs.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        next = async { jobs.lock().await.recv().await } => next,
                    };
                    let Some(QueuedJob { id, job }) = next else {
                        break;
                    };

                    info!("Worker {} running job {} ({})", worker, id, job);
                    let outcome = runner.run(job).await;
                    if outcome.is_ok() {
                        info!("Job {} finished: {}", id, outcome);
                    } else {
                        warn!("Job {} failed: {}", id, outcome);
                    }
                }
                info!("Notification worker {} stopped", worker);
            })
        })
        .collect()
}
