use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::{IndexJob, IndexScheduler, IndexingPipeline};

/// Job queue drained by a fixed pool of worker threads.
///
/// Workers run jobs in arrival order; two jobs for the same document may run
/// concurrently, the pipeline's current-version check keeps the newest one.
pub struct IndexingQueue {
    sender: Mutex<Option<Sender<IndexJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IndexingQueue {
    /// Spawn `workers` threads (at least one) consuming the queue.
    pub fn start(pipeline: Arc<IndexingPipeline>, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<IndexJob>();
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|n| {
                let pipeline = pipeline.clone();
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("index-worker-{n}"))
                    .spawn(move || worker_loop(&pipeline, &rx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to spawn indexing worker");
                    None
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = handles.len(), "Indexing queue started");

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Stop accepting jobs, let workers drain what is queued, then join them.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Indexing worker panicked");
            }
        }
    }
}

impl IndexScheduler for IndexingQueue {
    fn schedule(&self, job: IndexJob) {
        let sent = match self.sender.lock() {
            Ok(sender) => sender.as_ref().is_some_and(|tx| tx.send(job).is_ok()),
            Err(_) => false,
        };
        if sent {
            tracing::debug!(
                document_id = %job.document_id,
                version_id = %job.version_id,
                "Indexing job queued"
            );
        } else {
            tracing::warn!(
                document_id = %job.document_id,
                "Indexing queue closed, job dropped"
            );
        }
    }
}

impl Drop for IndexingQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(pipeline: &IndexingPipeline, rx: &Mutex<Receiver<IndexJob>>) {
    loop {
        // Hold the lock only while waiting for the next job.
        let job = match rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return,
        };
        match job {
            Ok(job) => {
                pipeline.run(job);
            }
            Err(_) => return,
        }
    }
}
