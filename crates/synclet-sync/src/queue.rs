//! Single-flight task queue.
//!
//! Every protocol-driven connector access of one synclet runs through its
//! queue, so reads and writes never interleave across tasks. Tasks run one
//! at a time in enqueue order on a worker spawned on first use. A task may
//! enqueue further tasks; the same worker picks them up after it finishes.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{Result, SyncError};

type Job = BoxFuture<'static, ()>;

/// Strictly ordered, single-concurrency task runner.
pub struct SyncQueue {
    sender: mpsc::UnboundedSender<Job>,
    /// Taken by the worker when it is spawned.
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    /// Enqueue a task without waiting for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.ensure_worker();
        self.sender
            .send(task.boxed())
            .map_err(|_| SyncError::QueueClosed)
    }

    /// Enqueue a task and wait for its result.
    ///
    /// Awaiting this from inside a queued task deadlocks the queue; use
    /// [`enqueue`](Self::enqueue) there instead.
    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(async move {
            // The caller may have stopped waiting.
            let _ = tx.send(task.await);
        })?;
        rx.await.map_err(|_| SyncError::QueueClosed)?
    }

    fn ensure_worker(&self) {
        let Some(mut receiver) = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let handle = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            trace!("sync queue drained and closed");
        });
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_task_result() {
        let queue = SyncQueue::new();
        let value = queue.run(async { Ok(41 + 1) }).await.unwrap();
        assert_eq!(value, 42);

        let err = queue
            .run(async { Err::<(), _>(SyncError::Transport("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tasks_never_overlap() {
        let queue = Arc::new(SyncQueue::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let queue = Arc::clone(&queue);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            handles.push(tokio::spawn(async move {
                queue
                    .run(async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reentrant_enqueue_runs_in_order() {
        let queue = Arc::new(SyncQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner_queue = Arc::clone(&queue);
        let inner_order = Arc::clone(&order);
        queue
            .run(async move {
                inner_order.lock().unwrap().push("outer");
                let nested_order = Arc::clone(&inner_order);
                inner_queue.enqueue(async move {
                    nested_order.lock().unwrap().push("nested");
                })?;
                inner_order.lock().unwrap().push("outer done");
                Ok(())
            })
            .await
            .unwrap();

        let tail_order = Arc::clone(&order);
        queue
            .run(async move {
                tail_order.lock().unwrap().push("tail");
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["outer", "outer done", "nested", "tail"]
        );
    }
}
