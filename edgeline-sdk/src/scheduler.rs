//! The scheduled-job engine. One task owns the job list, sleeps until
//! the earliest next-fire deadline, and hands due jobs to a fire
//! callback (which submits them to the worker pool). The job list is
//! a plain vector owned by the scheduler task; callers talk to it
//! over a command channel.

use std::sync::Mutex;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};
use tracing::{debug, info, warn};

/// What a job does when it fires.
#[derive(Clone, Debug, PartialEq)]
pub enum JobAction {
    /// Invoke the discovery handler (gated by the discovery mutex).
    Discovery,
    /// Synthesize a GET against the dispatcher; the string is the URL
    /// suffix after the device path prefix.
    DeviceUrl(String),
}

#[derive(Clone, Debug)]
pub struct Job {
    pub name: String,
    pub action: JobAction,
    pub period: Duration,
    /// Number of firings before the job retires; zero means forever.
    pub repeat: u64,
}

enum Cmd {
    Add(Job),
    SetJobs(Vec<Job>),
    Stop,
}

struct Entry {
    job: Job,
    next: Instant,
    fired: u64,
}

impl Entry {
    fn new(job: Job) -> Self {
        let next = Instant::now() + job.period;

        Entry {
            job,
            next,
            fired: 0,
        }
    }
}

pub struct Scheduler {
    tx: Mutex<Option<mpsc::UnboundedSender<Cmd>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<Vec<Job>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tx: Mutex::new(None),
            task: Mutex::new(None),
            pending: Mutex::new(vec![]),
        }
    }

    /// Registers a job. Before `start` the job is parked; afterwards
    /// it is live immediately.
    pub fn add(&self, job: Job) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(Cmd::Add(job));
        } else {
            self.pending.lock().unwrap().push(job)
        }
    }

    /// Replaces the whole job set. Used when metadata-side schedule
    /// events change under a running service.
    pub fn set_jobs(&self, jobs: Vec<Job>) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(Cmd::SetJobs(jobs));
        } else {
            *self.pending.lock().unwrap() = jobs
        }
    }

    /// Starts the scheduler task. Idempotent; a second call is a
    /// no-op.
    pub fn start<F>(&self, fire: F)
    where
        F: Fn(&Job) + Send + Sync + 'static,
    {
        let mut tx_slot = self.tx.lock().unwrap();

        if tx_slot.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let entries: Vec<_> = self
            .pending
            .lock()
            .unwrap()
            .drain(..)
            .map(Entry::new)
            .collect();

        info!("starting scheduler with {} job(s)", entries.len());
        *tx_slot = Some(tx);
        *self.task.lock().unwrap() =
            Some(tokio::spawn(run(entries, rx, fire)));
    }

    /// Stops the scheduler. A clean stop waits for the task to wind
    /// down; `force` abandons it. Idempotent.
    pub async fn stop(&self, force: bool) {
        let tx = self.tx.lock().unwrap().take();
        let task = self.task.lock().unwrap().take();

        if let Some(tx) = tx {
            let _ = tx.send(Cmd::Stop);
        }
        if let Some(task) = task {
            if force {
                task.abort();
            } else if task.await.is_err() {
                warn!("scheduler task exited abnormally")
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

async fn run<F>(
    mut entries: Vec<Entry>,
    mut rx: mpsc::UnboundedReceiver<Cmd>,
    fire: F,
) where
    F: Fn(&Job) + Send + Sync + 'static,
{
    loop {
        // Sleep until the earliest deadline; with no jobs, park far
        // enough out that only a command wakes us.

        let deadline = entries
            .iter()
            .map(|e| e.next)
            .min()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Cmd::Add(job)) => {
                    debug!("scheduling job {}", &job.name);
                    entries.push(Entry::new(job))
                }
                Some(Cmd::SetJobs(jobs)) => {
                    debug!("replacing job list ({} job(s))", jobs.len());
                    entries = jobs.into_iter().map(Entry::new).collect()
                }
                Some(Cmd::Stop) | None => break
            },
            _ = sleep_until(deadline) => {
                let now = Instant::now();

                for entry in entries.iter_mut() {
                    if entry.next <= now {
                        fire(&entry.job);
                        entry.fired += 1;
                        entry.next += entry.job.period;
                    }
                }
                entries.retain(|e| {
                    e.job.repeat == 0 || e.fired < e.job.repeat
                });
            }
        }
    }
    debug!("scheduler stopped")
}
