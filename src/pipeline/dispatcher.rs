//! Work queue and worker pool
//!
//! The dispatcher is the sole arbiter of task assignment: it never hands the
//! same task id to two workers concurrently, and it owns the per-task cancel
//! handles the HTTP cancel endpoint flips.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::task::{Task, TaskStore};
use crate::{RecapError, Result};

const QUEUE_DEPTH: usize = 256;

/// Bounded worker pool fed by an mpsc work queue
pub struct Dispatcher {
    tx: mpsc::Sender<String>,
    inner: Arc<DispatchInner>,
}

struct DispatchInner {
    store: Arc<TaskStore>,
    orchestrator: Arc<PipelineOrchestrator>,
    /// Task ids currently bound to a worker
    active: Mutex<HashSet<String>>,
    cancels: Mutex<HashMap<String, CancelHandle>>,
}

impl DispatchInner {
    fn cancel_handle(&self, id: &str) -> CancelHandle {
        let mut cancels = self.cancels.lock().unwrap_or_else(|e| e.into_inner());
        cancels.entry(id.to_string()).or_default().clone()
    }
}

impl Dispatcher {
    /// Spawn `workers` pipeline workers sharing the work queue.
    pub fn start(
        store: Arc<TaskStore>,
        orchestrator: Arc<PipelineOrchestrator>,
        workers: usize,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let inner = Arc::new(DispatchInner {
            store,
            orchestrator,
            active: Mutex::new(HashSet::new()),
            cancels: Mutex::new(HashMap::new()),
        });

        for worker_id in 0..workers.max(1) {
            let rx = rx.clone();
            let inner = inner.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, rx, inner).await;
            });
        }

        Arc::new(Self { tx, inner })
    }

    /// Create a new task for the media reference and queue it.
    pub async fn submit(&self, source_ref: &str) -> Result<Task> {
        let task = self.inner.store.create(source_ref)?;
        self.enqueue(task.id.clone()).await?;
        Ok(task)
    }

    /// Queue an existing task id for processing.
    ///
    /// At most one enqueue may be outstanding per task id: `submit` enqueues
    /// each new task once and `recover` runs before the API accepts traffic.
    /// A duplicate id dequeued while the task is in flight is dropped, not
    /// requeued; the running worker drives that task to a terminal state.
    pub async fn enqueue(&self, id: String) -> Result<()> {
        self.tx
            .send(id)
            .await
            .map_err(|_| RecapError::Pipeline("work queue closed".to_string()))
    }

    /// Re-enqueue every task left in a non-terminal state (startup recovery).
    pub async fn recover(&self) -> Result<usize> {
        let active = self.inner.store.list_active()?;
        let count = active.len();
        for task in active {
            info!("Recovering task {} ({})", task.id, task.status.as_str());
            self.enqueue(task.id).await?;
        }
        Ok(count)
    }

    /// Mark a task for cancellation.
    ///
    /// Best-effort: an in-flight stage may still complete, but no further
    /// stage starts and an in-flight summarize call is dropped.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let task = self.inner.store.get(id)?;
        if task.status.is_terminal() {
            return Err(RecapError::Conflict(format!(
                "task {} is already {}",
                id,
                task.status.as_str()
            )));
        }

        info!("Cancellation requested for task {}", id);
        self.inner.cancel_handle(id).cancel();
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    inner: Arc<DispatchInner>,
) {
    loop {
        let id = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(id) => id,
                None => break,
            }
        };

        // At-most-one worker per task, even if an id was enqueued twice
        {
            let mut active = inner.active.lock().unwrap_or_else(|e| e.into_inner());
            if !active.insert(id.clone()) {
                warn!("Worker {}: task {} already in flight, skipping", worker_id, id);
                continue;
            }
        }

        let cancel = inner.cancel_handle(&id);
        match inner.orchestrator.run_task(&id, &cancel).await {
            Ok(status) => {
                info!("Worker {}: task {} settled as {}", worker_id, id, status.as_str());
            }
            Err(e) => {
                error!("Worker {}: task {} aborted: {}", worker_id, id, e);
            }
        }

        let mut active = inner.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&id);
        drop(active);
        let mut cancels = inner.cancels.lock().unwrap_or_else(|e| e.into_inner());
        cancels.remove(&id);
    }
}
