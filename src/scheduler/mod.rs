//! Cooperative job scheduler
//!
//! Executes named recurring actions at their due times, one at a time,
//! isolating failures per job. The run loop is the only driver of
//! time-based work: it selects the earliest due entry, sleeps until its
//! fire time, runs the action to completion and immediately reschedules the
//! same job — exactly one live queue entry exists per job at all times, so
//! two runs of any job can never overlap and no two jobs run concurrently.
//!
//! Failure isolation follows the crate error split: recoverable errors (see
//! [`crate::error::Error::is_recoverable`]) are logged with the run
//! duration and the job stays scheduled; anything else propagates out of
//! [`JobScheduler::run_loop`] and terminates it. There is no automatic
//! job-disabling or backoff after repeated recoverable failures — a
//! deliberate simplicity trade-off.

mod trigger;

pub use trigger::Trigger;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::{Error, Result};

// ============================================================================
// Jobs
// ============================================================================

/// Boxed recurring action: no input, no output, may fail
pub type JobAction = Box<dyn FnMut() -> BoxFuture<'static, Result<()>> + Send>;

/// A named recurring action with a trigger rule
///
/// Created once via [`JobScheduler::add`] and never destroyed; the
/// scheduler only ever mutates its trigger state (the `DailyFirstRun`
/// capture) and its next fire time.
pub struct Job {
    /// Unique job name (the application namespaces module jobs as
    /// `"{module}.{job}"`)
    pub name: String,

    /// Fire-time rule
    pub trigger: Trigger,

    /// Tie-break when two jobs are due at the same instant; lower runs
    /// first
    pub priority: i32,

    action: JobAction,
}

impl Job {
    /// Create a job from an async action
    pub fn new<F, Fut>(name: impl Into<String>, trigger: Trigger, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            trigger,
            priority: 0,
            action: Box::new(move || Box::pin(action())),
        }
    }

    /// Set the tie-break priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

// ============================================================================
// Queue entries
// ============================================================================

/// One (fire-time, priority, job) entry in the time-ordered queue
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledEntry {
    at: DateTime<Utc>,
    priority: i32,
    job: String,
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.priority, &self.job).cmp(&(other.at, other.priority, &other.job))
    }
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Time-ordered recurring-action runner with per-job failure isolation
pub struct JobScheduler {
    jobs: HashMap<String, Job>,
    queue: BinaryHeap<Reverse<ScheduledEntry>>,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            queue: BinaryHeap::new(),
        }
    }

    /// Register a job and compute its first fire time
    pub fn add(&mut self, mut job: Job) -> Result<()> {
        if self.jobs.contains_key(&job.name) {
            return Err(Error::config(format!(
                "job name '{}' is already in use",
                job.name
            )));
        }
        if let Trigger::Interval(interval) = job.trigger {
            if interval.is_zero() {
                return Err(Error::config(format!(
                    "job '{}' has a zero interval",
                    job.name
                )));
            }
        }

        let at = job.trigger.first_fire(Utc::now());
        self.queue.push(Reverse(ScheduledEntry {
            at,
            priority: job.priority,
            job: job.name.clone(),
        }));
        tracing::debug!(job = %job.name, fire_at = %at, "job added");
        self.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no jobs are registered
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Whether a job name is taken
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Fire time of the earliest queued entry
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.queue.peek().map(|Reverse(e)| e.at)
    }

    /// Run jobs until the queue drains or a non-recoverable error escapes
    /// a job action
    ///
    /// Processes one due job at a time to completion, then immediately
    /// reschedules it. Sleeps when nothing is due.
    pub async fn run_loop(&mut self) -> Result<()> {
        while let Some(Reverse(entry)) = self.queue.pop() {
            let wait = entry.at.signed_duration_since(Utc::now());
            if let Ok(wait) = wait.to_std() {
                tokio::time::sleep(wait).await;
            }

            let job = self.jobs.get_mut(&entry.job).ok_or_else(|| {
                Error::config(format!("job '{}' vanished from the registry", entry.job))
            })?;

            tracing::debug!(job = %entry.job, "starting job");
            let started = Instant::now();
            let result = (job.action)().await;
            let elapsed = started.elapsed();

            match result {
                Ok(()) => {
                    tracing::debug!(
                        job = %entry.job,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "job finished"
                    );
                }
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(
                        job = %entry.job,
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %err,
                        "job failed, keeping its schedule"
                    );
                }
                Err(err) => return Err(err),
            }

            let at = job.trigger.next_fire(Utc::now());
            self.queue.push(Reverse(ScheduledEntry {
                at,
                priority: job.priority,
                job: entry.job,
            }));
        }

        tracing::warn!("no more jobs to run, stopping the scheduler");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_job(name: &str, interval: Duration, calls: Arc<AtomicUsize>) -> Job {
        Job::new(name, Trigger::Interval(interval), move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn test_add_duplicate_name() {
        let mut sched = JobScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        sched
            .add(counting_job("poll", Duration::from_secs(5), calls.clone()))
            .unwrap();
        let err = sched
            .add(counting_job("poll", Duration::from_secs(5), calls))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn test_add_zero_interval() {
        let mut sched = JobScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let err = sched
            .add(counting_job("poll", Duration::ZERO, calls))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_interval_job_is_due_immediately() {
        let mut sched = JobScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let before = Utc::now();
        sched
            .add(counting_job("poll", Duration::from_secs(5), calls))
            .unwrap();
        let fire = sched.next_fire_time().unwrap();
        assert!(fire >= before);
        assert!((fire - before).num_seconds() < 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_error_keeps_job_scheduled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let mut sched = JobScheduler::new();
        sched
            .add(Job::new(
                "flaky",
                Trigger::Interval(Duration::from_secs(5)),
                move || {
                    let c = c.clone();
                    async move {
                        match c.fetch_add(1, Ordering::SeqCst) {
                            // first run fails recoverably and is rescheduled
                            0 => Err(Error::app("transient failure")),
                            // second run fails fatally and stops the loop
                            _ => Err(Error::Io(io::Error::other("disk gone"))),
                        }
                    }
                },
            ))
            .unwrap();

        let err = sched.run_loop().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_respects_pause_between_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let times = Arc::new(std::sync::Mutex::new(Vec::new()));
        let c = calls.clone();
        let t = times.clone();

        let mut sched = JobScheduler::new();
        sched
            .add(Job::new(
                "poll",
                Trigger::Interval(Duration::from_secs(5)),
                move || {
                    let c = c.clone();
                    let t = t.clone();
                    async move {
                        t.lock().unwrap().push(tokio::time::Instant::now());
                        if c.fetch_add(1, Ordering::SeqCst) == 2 {
                            // stop the loop after three runs
                            Err(Error::Io(io::Error::other("done")))
                        } else {
                            Ok(())
                        }
                    }
                },
            ))
            .unwrap();

        sched.run_loop().await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let times = times.lock().unwrap();
        for pair in times.windows(2) {
            // paused tokio time advances by the scheduler's sleep only;
            // allow slack for the wall-clock arithmetic feeding it
            assert!(pair[1] - pair[0] >= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_entry_ordering() {
        let t = Utc::now();
        let early = ScheduledEntry {
            at: t,
            priority: 0,
            job: "early".to_string(),
        };
        let late = ScheduledEntry {
            at: t,
            priority: 5,
            job: "late".to_string(),
        };
        let sooner = ScheduledEntry {
            at: t - chrono::Duration::seconds(1),
            priority: 9,
            job: "sooner".to_string(),
        };

        // same fire time: lower priority runs first
        assert!(early < late);
        // earlier fire time wins regardless of priority
        assert!(sooner < early);
    }

    #[tokio::test]
    async fn test_empty_queue_ends_loop() {
        let mut sched = JobScheduler::new();
        assert!(sched.is_empty());
        sched.run_loop().await.unwrap();
    }
}
