//! Periodic triggers and manual run-now for registered pipelines.
//!
//! Each pipeline becomes a job holding its state behind a `tokio` mutex. A run
//! only starts if it can take that mutex without waiting, so overlapping
//! triggers (a slow run still in flight when the next tick fires, or a manual
//! run racing a timer) are skipped and logged rather than queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::SchedulerError;
use crate::pipelines::{run_once, Pipeline, PipelineReport};

/// Object-safe view of a registered pipeline.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    fn is_running(&self) -> bool;

    /// Run now, unless a run is already in flight (`None`).
    async fn try_run(&self) -> Option<PipelineReport>;

    async fn last_report(&self) -> Option<PipelineReport>;
}

struct Job<P: Pipeline> {
    pipeline: P,
    state: Mutex<P::State>,
    last: Mutex<Option<PipelineReport>>,
}

#[async_trait]
impl<P: Pipeline> Runnable for Job<P> {
    fn name(&self) -> &str {
        self.pipeline.name()
    }

    fn interval(&self) -> Duration {
        self.pipeline.interval()
    }

    fn is_running(&self) -> bool {
        self.state.try_lock().is_err()
    }

    async fn try_run(&self) -> Option<PipelineReport> {
        // ---
        let Ok(mut state) = self.state.try_lock() else {
            tracing::warn!(pipeline = self.name(), "previous run still in progress, skipping");
            return None;
        };
        let report = run_once(&self.pipeline, &mut state).await;
        drop(state);

        *self.last.lock().await = Some(report.clone());
        Some(report)
    }

    async fn last_report(&self) -> Option<PipelineReport> {
        self.last.lock().await.clone()
    }
}

/// Snapshot of one job for listings.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub name: String,
    pub interval_secs: u64,
    pub running: bool,
    pub last_report: Option<PipelineReport>,
}

pub struct Scheduler {
    jobs: Vec<Arc<dyn Runnable>>,
    startup_delay: Duration,
}

impl Scheduler {
    // ---
    pub fn new(startup_delay: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            startup_delay,
        }
    }

    pub fn register<P: Pipeline>(&mut self, pipeline: P) {
        // ---
        tracing::info!(
            pipeline = pipeline.name(),
            interval = ?pipeline.interval(),
            "registered pipeline"
        );
        self.jobs.push(Arc::new(Job {
            pipeline,
            state: Mutex::new(P::State::default()),
            last: Mutex::new(None),
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name().to_string()).collect()
    }

    fn job(&self, name: &str) -> Result<&Arc<dyn Runnable>, SchedulerError> {
        self.jobs
            .iter()
            .find(|j| j.name() == name)
            .ok_or_else(|| SchedulerError::UnknownPipeline(name.to_string()))
    }

    /// Manual trigger through the same skip-if-running guard as the timers.
    pub async fn run_now(&self, name: &str) -> Result<PipelineReport, SchedulerError> {
        // ---
        let job = self.job(name)?;
        job.try_run()
            .await
            .ok_or_else(|| SchedulerError::AlreadyRunning(name.to_string()))
    }

    pub async fn status(&self) -> Vec<PipelineStatus> {
        // ---
        let mut out = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            out.push(PipelineStatus {
                name: job.name().to_string(),
                interval_secs: job.interval().as_secs(),
                running: job.is_running(),
                last_report: job.last_report().await,
            });
        }
        out
    }

    /// Start one timer per job: first run after the startup delay, then every
    /// interval. Each tick runs in its own task so a slow run shows up as a
    /// skipped tick instead of a delayed timer.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        // ---
        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                let delay = self.startup_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut ticker = tokio::time::interval(job.interval());
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        let job = Arc::clone(&job);
                        tokio::spawn(async move {
                            job.try_run().await;
                        });
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::PipelineError;
    use crate::error::StoreError;
    use crate::pipelines::WriteStats;
    use tokio::sync::Notify;

    /// Blocks until released, counting its runs.
    struct Gated {
        release: Arc<Notify>,
        fail: bool,
    }

    #[async_trait]
    impl Pipeline for Gated {
        type State = u32;

        fn name(&self) -> &str {
            "gated"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn execute(
            &self,
            runs: &mut u32,
            stats: &mut WriteStats,
        ) -> Result<String, PipelineError> {
            self.release.notified().await;
            *runs += 1;
            stats.inserted = u64::from(*runs);
            if self.fail {
                return Err(StoreError::Unavailable("down".into()).into());
            }
            Ok(format!("run {runs}"))
        }
    }

    fn scheduler(fail: bool) -> (Arc<Scheduler>, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let mut s = Scheduler::new(Duration::ZERO);
        s.register(Gated {
            release: release.clone(),
            fail,
        });
        (Arc::new(s), release)
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped_not_queued() {
        // ---
        let (sched, release) = scheduler(false);

        let first = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.run_now("gated").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            sched.run_now("gated").await.unwrap_err(),
            SchedulerError::AlreadyRunning("gated".into())
        );

        release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.message, "run 1");

        // State carried over to the next run
        release.notify_one();
        let report = sched.run_now("gated").await.unwrap();
        assert_eq!(report.stats.inserted, 2);
    }

    #[tokio::test]
    async fn failures_become_reports() {
        // ---
        let (sched, release) = scheduler(true);
        release.notify_one();
        let report = sched.run_now("gated").await.unwrap();
        assert!(!report.success);
        assert!(report.message.contains("down"));

        let status = sched.status().await;
        assert_eq!(status[0].name, "gated");
        assert!(!status[0].running);
        assert!(!status[0].last_report.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn unknown_pipeline_is_rejected() {
        let (sched, _) = scheduler(false);
        assert_eq!(
            sched.run_now("nope").await.unwrap_err(),
            SchedulerError::UnknownPipeline("nope".into())
        );
    }
}
