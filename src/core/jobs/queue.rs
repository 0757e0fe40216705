//! Background job queue
//!
//! Jobs run as tokio tasks keyed by [`JobId`]. A job id has at most one live
//! executor, and a semaphore caps how many jobs execute at once; queued jobs
//! wait for a permit before their work starts.

use crate::domain::ids::JobId;
use crate::domain::{Result, WardenError};
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

/// Live executor for one job
struct ExecutorHandle {
    done: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

/// Job id → executor registry with bounded concurrency
pub struct JobQueue {
    executors: Arc<Mutex<HashMap<JobId, ExecutorHandle>>>,
    permits: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl JobQueue {
    pub fn new(max_concurrent_jobs: usize, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            executors: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            shutdown,
        }
    }

    /// Shutdown signal shared with executors
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Start `work` as the executor for `job_id`
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::JobAlreadyRunning`] if the job already has a
    /// live executor.
    pub async fn submit<F>(&self, job_id: JobId, work: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // The registry lock is held until the handle is inserted, so the
        // task's own removal always runs after the insert.
        let mut executors = self.executors.lock().await;
        if executors.contains_key(&job_id) {
            return Err(WardenError::JobAlreadyRunning(job_id.to_string()));
        }

        let (done_tx, done_rx) = watch::channel(false);
        let registry = self.executors.clone();
        let permits = self.permits.clone();

        let task = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await;
            if let Err(e) = tokio::spawn(work).await {
                tracing::error!(job_id = %job_id, error = %e, "Job executor terminated abnormally");
            }
            registry.lock().await.remove(&job_id);
            let _ = done_tx.send(true);
        });

        executors.insert(
            job_id,
            ExecutorHandle {
                done: done_rx,
                task,
            },
        );
        tracing::debug!(job_id = %job_id, "Job submitted");
        Ok(())
    }

    /// Whether a job has a live executor
    pub async fn is_active(&self, job_id: JobId) -> bool {
        self.executors
            .lock()
            .await
            .get(&job_id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub async fn active_jobs(&self) -> Vec<JobId> {
        self.executors.lock().await.keys().copied().collect()
    }

    /// Wait until the executor of `job_id` (if any) has finished
    pub async fn wait(&self, job_id: JobId) {
        let done = self
            .executors
            .lock()
            .await
            .get(&job_id)
            .map(|handle| handle.done.clone());
        if let Some(mut done) = done {
            // An error means the sender is gone, i.e. the executor finished
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Wait for every live executor
    pub async fn wait_all(&self) {
        let active = self.active_jobs().await;
        join_all(active.into_iter().map(|job_id| self.wait(job_id))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn queue(max: usize) -> JobQueue {
        let (_tx, rx) = watch::channel(false);
        JobQueue::new(max, rx)
    }

    #[tokio::test]
    async fn test_single_executor_per_job() {
        let q = queue(2);
        let id = JobId::new();
        let (release_tx, mut release_rx) = watch::channel(false);
        q.submit(id, async move {
            let _ = release_rx.wait_for(|r| *r).await;
        })
        .await
        .unwrap();

        let second = q.submit(id, async {}).await;
        assert!(matches!(second, Err(WardenError::JobAlreadyRunning(_))));

        release_tx.send(true).unwrap();
        q.wait(id).await;
        assert!(!q.is_active(id).await);
        q.submit(id, async {}).await.unwrap();
        q.wait(id).await;
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let q = queue(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let running = running.clone();
            let peak = peak.clone();
            q.submit(JobId::new(), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        q.wait_all().await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(q.active_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_wait_on_unknown_job_returns() {
        queue(1).wait(JobId::new()).await;
    }
}
