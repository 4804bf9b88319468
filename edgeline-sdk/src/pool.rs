//! A fixed-size pool of worker tasks. Event posts and scheduled jobs
//! run here so neither the dispatcher nor the scheduler ever waits on
//! a slow peer service.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

type Job = BoxFuture<'static, ()>;

/// Default number of workers, matching the platform's historical pool
/// size.
pub const POOL_WORKERS: usize = 8;

pub struct WorkerPool {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let workers = (0..size)
            .map(|_| {
                let rx = rx.clone();

                tokio::spawn(async move {
                    loop {
                        // Release the receiver lock before running
                        // the job so the other workers keep draining.

                        let job = { rx.lock().await.recv().await };

                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        WorkerPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues a job. Never blocks; jobs submitted after `stop` are
    /// dropped.
    pub fn submit(&self, job: Job) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            if tx.send(job).is_err() {
                debug!("worker pool is gone; dropping job")
            }
        } else {
            debug!("worker pool is stopped; dropping job")
        }
    }

    /// Shuts the pool down. Queued and in-flight jobs are drained
    /// first unless `force` is set, in which case they are abandoned.
    /// Safe to call more than once.
    pub async fn stop(&self, force: bool) {
        drop(self.tx.lock().unwrap().take());

        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();

        for worker in workers {
            if force {
                worker.abort();
            } else if worker.await.is_err() {
                debug!("worker exited abnormally")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_jobs_run_and_drain() {
        let pool = WorkerPool::new(4);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let count = count.clone();

            pool.submit(Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // A clean stop drains everything that was queued.

        pool.stop(false).await;
        assert_eq!(count.load(Ordering::SeqCst), 20);

        // Submissions after stop are dropped, and stop is idempotent.

        pool.submit(Box::pin(async {}));
        pool.stop(false).await;
    }
}
