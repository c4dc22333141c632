//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! Every registered job runs through a [`JobRunner`], which applies the overlap
//! policy and jitter, hands the job a cancellation token and logs the outcome.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::parse_timezone;
use crate::{Jitter, OverlapGuard, OverlapPolicy, SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression (sec min hour day-of-month month day-of-week).
///
/// ```
/// use member_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 3 * * *").is_ok());
/// assert!(validate_cron_expression("0 */5 * * * *").is_ok());
/// assert!(validate_cron_expression("every night").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// How a single tick ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    /// The previous run was still active.
    Skipped,
    /// Shutdown began before the job started.
    Cancelled,
}

/// Executes one job body per tick.
pub struct JobRunner<F> {
    name: String,
    guard: OverlapGuard,
    jitter: Jitter,
    token: CancellationToken,
    active: Arc<AtomicUsize>,
    job_fn: F,
}

struct ActiveRun(Arc<AtomicUsize>);

impl ActiveRun {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<F, Fut> JobRunner<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send,
{
    pub fn new(
        name: impl Into<String>,
        policy: OverlapPolicy,
        jitter: Jitter,
        token: CancellationToken,
        job_fn: F,
    ) -> Self {
        Self {
            name: name.into(),
            guard: OverlapGuard::new(policy),
            jitter,
            token,
            active: Arc::new(AtomicUsize::new(0)),
            job_fn,
        }
    }

    fn with_active_counter(mut self, active: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guard(&self) -> &OverlapGuard {
        &self.guard
    }

    /// Run the job once, honoring overlap policy, jitter and cancellation.
    pub async fn run_once(&self) -> RunOutcome {
        if self.token.is_cancelled() {
            return RunOutcome::Cancelled;
        }
        let Some(_run) = self.guard.try_acquire() else {
            warn!(job = %self.name, skipped = self.guard.skipped(), "Previous run still active, skipping");
            return RunOutcome::Skipped;
        };
        let _active = ActiveRun::enter(&self.active);

        tokio::select! {
            _ = self.token.cancelled() => {
                debug!(job = %self.name, "Cancelled during jitter delay");
                return RunOutcome::Cancelled;
            }
            _ = self.jitter.delay() => {}
        }

        info!(job = %self.name, "Job started");
        let start = Instant::now();
        let result = (self.job_fn)(self.token.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(job = %self.name, elapsed_ms, "Job completed");
                RunOutcome::Completed
            }
            Err(e) => {
                warn!(job = %self.name, elapsed_ms, error = %e, "Job failed");
                RunOutcome::Failed(e)
            }
        }
    }
}

/// Owns the cron scheduler and the shutdown token shared by all jobs.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
    active_runs: Arc<AtomicUsize>,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a stopped scheduler. The default timezone is validated here.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            shutdown_token: CancellationToken::new(),
            active_runs: Arc::new(AtomicUsize::new(0)),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!("Scheduler started");
        Ok(())
    }

    /// Cancel running jobs, wait for them up to the configured timeout, then stop.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.active_runs.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    active = self.active_runs.load(Ordering::SeqCst),
                    "Shutdown timeout reached with jobs still running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Jobs currently past their overlap check.
    pub fn active_runs(&self) -> usize {
        self.active_runs.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a cron job.
    ///
    /// `timezone` falls back to the configured default. The job body receives
    /// the shutdown token and reports failure as a message, which is logged.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        policy: OverlapPolicy,
        jitter: Jitter,
        job_fn: F,
    ) -> Result<Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let tz: Tz = match timezone {
            Some(tz) => parse_timezone(tz)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        let runner = Arc::new(
            JobRunner::new(name, policy, jitter, self.shutdown_token.clone(), job_fn)
                .with_active_counter(self.active_runs.clone()),
        );

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let runner = runner.clone();
            Box::pin(async move {
                runner.run_once().await;
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(
            job = %name,
            uuid = %uuid,
            cron = %cron_expr,
            timezone = %tz.name(),
            policy = ?policy,
            jitter_secs = jitter.max_secs,
            "Job registered"
        );
        Ok(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_shutdown() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let token = scheduler.shutdown_token();

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(token.is_cancelled());
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_default_timezone() {
        let config = SchedulerConfig::default().with_timezone("Nowhere/Land");
        assert!(matches!(
            SchedulerService::new(config).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 0 3 * * *").is_ok());
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("* * *").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_rejects_bad_input() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();

        let bad_cron = scheduler
            .register_job("bad", "nope", None, OverlapPolicy::Skip, Jitter::none(), |_t| async {
                Ok(())
            })
            .await;
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron(_))));

        let bad_tz = scheduler
            .register_job(
                "bad",
                "0 0 3 * * *",
                Some("Invalid/Zone"),
                OverlapPolicy::Skip,
                Jitter::none(),
                |_t| async { Ok(()) },
            )
            .await;
        assert!(matches!(bad_tz, Err(SchedulerError::InvalidTimezone(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registered_job_fires() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        let uuid = scheduler
            .register_job(
                "tick",
                "* * * * * *",
                Some("UTC"),
                OverlapPolicy::Skip,
                Jitter::none(),
                move |_token| {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();
        assert!(!uuid.is_nil());

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2200)).await;
        scheduler.shutdown().await.unwrap();

        assert!(counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_runner_reports_outcomes() {
        let token = CancellationToken::new();
        let ok = JobRunner::new("ok", OverlapPolicy::Skip, Jitter::none(), token.clone(), |_t| async {
            Ok(())
        });
        assert_eq!(ok.run_once().await, RunOutcome::Completed);

        let failing = JobRunner::new(
            "failing",
            OverlapPolicy::Skip,
            Jitter::none(),
            token.clone(),
            |_t| async { Err("store unavailable".to_string()) },
        );
        assert_eq!(
            failing.run_once().await,
            RunOutcome::Failed("store unavailable".to_string())
        );
        assert!(!failing.guard().is_running());

        token.cancel();
        assert_eq!(ok.run_once().await, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_runner_skips_overlapping_tick() {
        let token = CancellationToken::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let release = gate.clone();
        let runner = Arc::new(JobRunner::new(
            "slow",
            OverlapPolicy::Skip,
            Jitter::none(),
            token,
            move |_t| {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok(())
                }
            },
        ));

        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run_once().await }
        });
        while !runner.guard().is_running() {
            tokio::task::yield_now().await;
        }

        assert_eq!(runner.run_once().await, RunOutcome::Skipped);
        release.notify_one();
        assert_eq!(first.await.unwrap(), RunOutcome::Completed);
        assert_eq!(runner.guard().skipped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_jitter() {
        let token = CancellationToken::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let runner = Arc::new(JobRunner::new(
            "jittery",
            OverlapPolicy::Skip,
            Jitter::new(3600),
            token.clone(),
            move |_t| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        let handle = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run_once().await }
        });
        tokio::task::yield_now().await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), RunOutcome::Cancelled);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
