//! Fixed-size worker pool for consumer invocations.
//!
//! `submit` never waits. A job lands in the bounded queue when there is room;
//! otherwise a small task holds it until a slot frees up, so bursts are
//! absorbed rather than dropped. A fixed number of workers drain the queue;
//! each job is isolated, so an error or a panic is logged under the job's
//! label and the worker moves on to the next one.

use std::{
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    futures::FutureExt,
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, warn},
    wxhook_common::panic_message,
};

use crate::error::{Error, Result};

type BoxedJob = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

struct Task {
    label: String,
    job: BoxedJob,
}

/// Bounded pool of async workers.
pub struct WorkPool {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    queue_capacity: usize,
    running: Arc<AtomicUsize>,
    overflow: Arc<AtomicUsize>,
}

impl WorkPool {
    /// Spawn `size` workers sharing a queue of `queue_capacity` jobs. Must be
    /// called from within a Tokio runtime. Zero values are raised to one.
    pub fn new(size: usize, queue_capacity: usize) -> Self {
        let size = size.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Task>(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let running = Arc::new(AtomicUsize::new(0));

        let workers = (0..size)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let running = Arc::clone(&running);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(task) = next else {
                            break;
                        };
                        running.fetch_add(1, Ordering::Relaxed);
                        run(id, task).await;
                        running.fetch_sub(1, Ordering::Relaxed);
                    }
                    debug!(worker = id, "worker stopped");
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            size,
            queue_capacity,
            running,
            overflow: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue `job` without waiting. Fails only once the pool is shut down.
    pub fn submit<F>(&self, label: impl Into<String>, job: F) -> Result<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(Error::PoolClosed)?;
        let task = Task {
            label,
            job: Box::pin(job),
        };
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                debug!(job = %task.label, "queue full, job waiting for a slot");
                let overflow = Arc::clone(&self.overflow);
                overflow.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(task)) = sender.send(task).await {
                        warn!(job = %task.label, "work pool closed, job dropped");
                    }
                    overflow.fetch_sub(1, Ordering::Relaxed);
                });
                Ok(())
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::PoolClosed),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Jobs waiting for a worker, including those waiting for a queue slot.
    pub fn queued(&self) -> usize {
        let in_queue = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |tx| self.queue_capacity - tx.capacity());
        in_queue + self.overflow.load(Ordering::Relaxed)
    }

    /// Jobs currently executing.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop accepting jobs, let the workers finish everything already
    /// accepted, and wait for them to exit. Jobs still waiting for a slot
    /// hold their own sender, so the workers keep running until those are
    /// delivered too.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(|e| e.into_inner()).take());
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn run(worker: usize, task: Task) {
    let Task { label, job } = task;
    match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(())) => debug!(worker, job = %label, "job finished"),
        Ok(Err(e)) => warn!(worker, job = %label, error = %e, "job failed"),
        Err(panic) => warn!(
            worker,
            job = %label,
            error = %panic_message(&*panic),
            "job panicked"
        ),
    }
}
