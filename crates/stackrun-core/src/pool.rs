//! Bounded worker pool
//!
//! - Fixed number of workers pulling jobs from a shared queue
//! - Each job runs on the blocking thread pool
//! - No cancellation: every dispatched job runs to completion
//! - A panicking job is reported, not propagated

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A named unit of blocking work
pub struct Job<T> {
    pub name: String,
    action: Box<dyn FnOnce() -> T + Send + 'static>,
}

impl<T> Job<T> {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(action),
        }
    }
}

/// Job result, in completion order
#[derive(Debug)]
pub struct JobResult<T> {
    pub name: String,
    pub duration: Duration,
    /// `Err` carries the panic message
    pub output: Result<T, String>,
}

/// Fixed-size pool of concurrent workers
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job, at most `workers` at a time, and collect all results
    pub async fn execute<T: Send + 'static>(&self, jobs: Vec<Job<T>>) -> Vec<JobResult<T>> {
        if jobs.is_empty() {
            return vec![];
        }

        let start = Instant::now();
        let total = jobs.len();
        let queue = Arc::new(Mutex::new(jobs.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::channel::<JobResult<T>>(total);

        let handles: Vec<JoinHandle<()>> = (0..self.workers.min(total))
            .map(|worker| spawn_worker(worker, Arc::clone(&queue), tx.clone()))
            .collect();
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        for handle in handles {
            let _ = handle.await;
        }

        tracing::info!(
            "Worker pool completed {} jobs in {:?}",
            results.len(),
            start.elapsed()
        );
        results
    }
}

fn spawn_worker<T: Send + 'static>(
    worker: usize,
    queue: Arc<Mutex<VecDeque<Job<T>>>>,
    tx: mpsc::Sender<JobResult<T>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = queue.lock().await.pop_front();
            let Some(Job { name, action }) = next else {
                break;
            };

            tracing::debug!(worker, job = %name, "picked up job");
            let start = Instant::now();
            let output = tokio::task::spawn_blocking(action)
                .await
                .map_err(|e| format!("Task panicked: {}", e));

            let result = JobResult {
                name,
                duration: start.elapsed(),
                output,
            };
            if tx.send(result).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_all_jobs_complete() {
        let jobs: Vec<_> = (0..5)
            .map(|i| Job::new(format!("job{}", i), move || i * 2))
            .collect();

        let results = WorkerPool::new(2).execute(jobs).await;

        assert_eq!(results.len(), 5);
        let mut outputs: Vec<_> = results.into_iter().map(|r| r.output.unwrap()).collect();
        outputs.sort();
        assert_eq!(outputs, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        // The pool must never run more than its worker count at once
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let current_concurrent = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..10)
            .map(|i| {
                let max = Arc::clone(&max_concurrent);
                let current = Arc::clone(&current_concurrent);

                Job::new(format!("Task{}", i), move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);

                    std::thread::sleep(Duration::from_millis(50));
                    current.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        WorkerPool::new(3).execute(jobs).await;

        let max = max_concurrent.load(Ordering::SeqCst);
        assert!(max <= 3, "Concurrency limit exceeded: {}", max);
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_siblings() {
        let ran = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<Job<()>> = (0..4)
            .map(|i| {
                let ran = Arc::clone(&ran);
                Job::new(format!("job{}", i), move || {
                    if i == 1 {
                        panic!("boom");
                    }
                    ran.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let results = WorkerPool::new(2).execute(jobs).await;

        assert_eq!(results.len(), 4);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        let failed = results.iter().find(|r| r.name == "job1").unwrap();
        assert!(failed.output.is_err());
    }

    #[tokio::test]
    async fn test_empty() {
        let results = WorkerPool::new(6).execute(Vec::<Job<()>>::new()).await;
        assert!(results.is_empty());
    }
}
