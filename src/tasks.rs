//! Bounded worker pool for ingestion jobs.
//!
//! Jobs go into a tokio `mpsc` channel drained by a fixed number of worker
//! tasks. Every submission returns a [`JobHandle`] carrying the job's id and a
//! oneshot receiver for its result, so completion and failure are always
//! observable by the submitter.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingest::{IngestOutcome, Ingestor};
use crate::models::NewDocument;

/// Work accepted by the queue.
#[derive(Debug, Clone)]
pub enum IngestJob {
    /// A Markdown file on disk, parsed for front matter.
    File(PathBuf),
    /// An already-parsed document.
    Document(NewDocument),
}

struct Envelope {
    id: Uuid,
    job: IngestJob,
    reply: oneshot::Sender<Result<IngestOutcome>>,
}

/// Receipt for a submitted job.
pub struct JobHandle {
    id: Uuid,
    rx: oneshot::Receiver<Result<IngestOutcome>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the job to finish and return its result.
    pub async fn wait(self) -> Result<IngestOutcome> {
        self.rx.await.map_err(|_| Error::QueueClosed)?
    }
}

pub struct IngestQueue {
    tx: mpsc::Sender<Envelope>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestQueue {
    /// Spawn `workers` tasks (at least one) running jobs through `ingestor`.
    pub fn start(ingestor: Ingestor, workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel(workers * 4);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| tokio::spawn(run_worker(worker_id, ingestor.clone(), rx.clone())))
            .collect();

        Self {
            tx,
            workers: handles,
        }
    }

    /// Enqueue a job, waiting for channel capacity if the workers are busy.
    pub async fn submit(&self, job: IngestJob) -> Result<JobHandle> {
        let id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { id, job, reply })
            .await
            .map_err(|_| Error::QueueClosed)?;
        debug!(%id, "job submitted");
        Ok(JobHandle { id, rx })
    }

    /// Close the queue and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "ingest worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    ingestor: Ingestor,
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(Envelope { id, job, reply }) = next else {
            break;
        };

        debug!(worker_id, %id, "job started");
        let result = match &job {
            IngestJob::File(path) => ingestor.ingest_file(path).await,
            IngestJob::Document(doc) => ingestor.ingest_document(doc).await,
        };
        if let Err(e) = &result {
            warn!(worker_id, %id, error = %e, "ingest job failed");
        }
        // The submitter may have dropped its handle.
        let _ = reply.send(result);
    }
    debug!(worker_id, "worker stopped");
}
