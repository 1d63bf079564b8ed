use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::classifier::{Classifier, RawClassification};
use crate::config::WorkerSettings;

type ReplySender = oneshot::Sender<anyhow::Result<RawClassification>>;

struct QueuedJob {
    input: String,
    reply_tx: ReplySender,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification timed out")]
    TimedOut,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Submits classification jobs to the pool and waits for the reply under a
/// deadline. A timed-out job keeps running on its worker; the late reply
/// lands on a dropped channel and is discarded.
#[derive(Clone)]
pub struct ClassifierHandle {
    job_tx: flume::Sender<QueuedJob>,
    timeout: Duration,
}

impl ClassifierHandle {
    pub async fn classify(&self, input: &str) -> Result<RawClassification, ClassifyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = QueuedJob {
            input: input.to_owned(),
            reply_tx,
        };

        // The deadline covers time spent queued as well as model latency.
        let wait = async {
            self.job_tx
                .send_async(job)
                .await
                .map_err(|_| anyhow!("classifier queue is closed"))?;
            reply_rx
                .await
                .map_err(|_| anyhow!("classifier worker dropped the reply"))?
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Err(_) => Err(ClassifyError::TimedOut),
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(ClassifyError::Failed(err)),
        }
    }
}

pub struct ClassifierPool {
    job_rx: flume::Receiver<QueuedJob>,
    classifier: Arc<dyn Classifier>,
    workers: usize,
}

impl ClassifierPool {
    pub fn new(
        settings: WorkerSettings,
        classifier: Arc<dyn Classifier>,
    ) -> (ClassifierHandle, ClassifierPool) {
        // Rendezvous channel: a job is only accepted once a worker is free.
        let (job_tx, job_rx) = flume::bounded(0);

        let handle = ClassifierHandle {
            job_tx,
            timeout: settings.classify_timeout,
        };
        let pool = ClassifierPool {
            job_rx,
            classifier,
            workers: settings.workers,
        };

        (handle, pool)
    }

    /// Spawns the worker tasks and resolves once all of them have exited,
    /// either on cancellation or when every handle is gone.
    #[tracing::instrument(skip(self, cancel), fields(workers = self.workers))]
    pub async fn run_until_cancelled(self, cancel: CancellationToken) {
        let mut tasks = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let job_rx = self.job_rx.clone();
            let classifier = Arc::clone(&self.classifier);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(worker_loop(worker_id, job_rx, classifier, cancel)));
        }
        drop(self.job_rx);

        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("classifier pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    job_rx: flume::Receiver<QueuedJob>,
    classifier: Arc<dyn Classifier>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx.recv_async() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        tracing::debug!(worker_id, "classification job picked up");
        let result = classifier.classify(&job.input).await;
        // The caller may have timed out and dropped the receiver by now.
        let _ = job.reply_tx.send(result);
    }
    tracing::debug!(worker_id, "classifier worker exiting");
}
