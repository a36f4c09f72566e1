//! OperationPool - concurrent operation processing
//!
//! Each worker task:
//! - Owns the receiving end of its own bounded queue
//! - Runs `process_operation` and replies via oneshot
//!
//! Jobs are spread round-robin over workers through an atomic counter.
//! Audit ordering is unaffected since every write still goes through the
//! single recorder task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use warden_core::Operation;

use crate::cancel::CancelToken;
use crate::error::{KernelError, KernelResult};
use crate::orchestrator::Orchestrator;
use crate::outcome::ProcessOutcome;

struct Job {
    op: Operation,
    cancel: CancelToken,
    reply: oneshot::Sender<ProcessOutcome>,
}

pub struct OperationPool {
    senders: Vec<mpsc::Sender<Job>>,
    tasks: Vec<JoinHandle<()>>,
    /// Round-robin counter (lock-free)
    counter: AtomicUsize,
}

impl OperationPool {
    /// Spawn `workers` tasks, each with a queue of `queue_depth` jobs
    pub fn spawn(orchestrator: Arc<Orchestrator>, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut tasks = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, rx) = mpsc::channel::<Job>(queue_depth.max(1));
            tasks.push(tokio::spawn(worker_loop(worker, orchestrator.clone(), rx)));
            senders.push(tx);
        }

        tracing::debug!(workers, "Operation pool started");
        Self {
            senders,
            tasks,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    pub async fn submit(&self, op: Operation) -> KernelResult<ProcessOutcome> {
        self.submit_with_cancel(op, CancelToken::new()).await
    }

    pub async fn submit_with_cancel(
        &self,
        op: Operation,
        cancel: CancelToken,
    ) -> KernelResult<ProcessOutcome> {
        let (reply, rx) = oneshot::channel();
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.senders.len();

        self.senders[idx]
            .send(Job { op, cancel, reply })
            .await
            .map_err(|_| KernelError::PoolClosed)?;

        rx.await.map_err(|_| KernelError::PoolClosed)
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.senders);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Operation worker panicked");
            }
        }
        tracing::debug!("Operation pool stopped");
    }
}

async fn worker_loop(worker: usize, orchestrator: Arc<Orchestrator>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        let outcome = orchestrator.process_operation(job.op, &job.cancel).await;
        // The submitter may have stopped waiting
        let _ = job.reply.send(outcome);
    }
    tracing::debug!(worker, "Operation worker stopped");
}
