//! Background job orchestration with observable status.
//!
//! Two job kinds exist, scrape and process. Each has one [`JobTracker`] for
//! the lifetime of the process, owned by the [`JobRegistry`]. A tracker is
//! the sending half of a `tokio::sync::watch` channel: the running job is
//! the only writer, and any number of observers can take a snapshot or
//! subscribe to changes.
//!
//! # State machine
//!
//! ```text
//! Idle (running=false, progress=0)
//!   └─ claim ─▶ Running (running=true, progress rises through milestones)
//!                 ├─▶ Done   (running=false, progress=100)
//!                 └─▶ Failed (running=false, progress=0, message=<error>)
//! ```
//!
//! There is no pause or cancel. Once started a job runs unattended until it
//! reaches a terminal state; a panic inside a stage is caught at the job
//! boundary and recorded as `Failed`.
//!
//! # Single-flight
//!
//! A start request claims its tracker with a compare-and-set inside
//! [`watch::Sender::send_if_modified`], so two concurrent requests can never
//! both observe `running=false` and both proceed. Start calls that inspect
//! more than one tracker hold the registry's start gate while they check
//! and claim. Rejections are returned synchronously as [`StartError`] and do
//! not touch the job's status.
//!
//! # Combined workflow
//!
//! [`Orchestrator::start_combined`] awaits the scrape job's own future as
//! its completion signal, then starts processing only when scraping ended
//! at progress 100.

use crate::error::{PipelineError, StartError};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scrape,
    Process,
}

impl JobKind {
    /// Capitalized label used at the start of status messages.
    pub fn title(self) -> &'static str {
        match self {
            JobKind::Scrape => "Scraping",
            JobKind::Process => "Processing",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Scrape => "scraping",
            JobKind::Process => "processing",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub running: bool,
    /// 0–100; never decreases while `running`.
    pub progress: u8,
    pub message: String,
    /// Completion time of the last successful run.
    pub last_run: Option<DateTime<Local>>,
    pub files_created: Vec<String>,
}

impl JobStatus {
    fn idle(kind: JobKind) -> Self {
        Self {
            running: false,
            progress: 0,
            message: match kind {
                JobKind::Scrape => "Ready to scrape".to_string(),
                JobKind::Process => "Ready to process".to_string(),
            },
            last_run: None,
            files_created: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        !self.running && self.progress == 100
    }
}

/// What a finished stage reports back to its tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub message: String,
    pub files: Vec<String>,
}

/// Status cell for one job kind.
#[derive(Debug)]
pub struct JobTracker {
    kind: JobKind,
    tx: watch::Sender<JobStatus>,
}

impl JobTracker {
    pub(crate) fn new(kind: JobKind) -> Self {
        Self {
            kind,
            tx: watch::Sender::new(JobStatus::idle(kind)),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn snapshot(&self) -> JobStatus {
        self.tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.tx.borrow().running
    }

    /// Observe status changes without taking part in them.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.tx.subscribe()
    }

    /// Idle → Running. Returns `false`, leaving the status alone, when the job
    /// is already running.
    fn try_claim(&self, message: &str) -> bool {
        self.tx.send_if_modified(|status| {
            if status.running {
                return false;
            }
            status.running = true;
            status.progress = 0;
            status.message = message.to_string();
            status.files_created.clear();
            true
        })
    }

    /// Report a milestone. Progress never moves backwards.
    pub fn advance(&self, progress: u8, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|status| {
            status.progress = status.progress.max(progress.min(100));
            status.message = message;
        });
    }

    fn succeed(&self, output: StageOutput) {
        self.tx.send_modify(|status| {
            status.running = false;
            status.progress = 100;
            status.message = output.message;
            status.last_run = Some(Local::now());
            status.files_created = output.files;
        });
    }

    fn fail(&self, message: String) {
        self.tx.send_modify(|status| {
            status.running = false;
            status.progress = 0;
            status.message = message;
        });
    }
}

/// Snapshot of both jobs, as returned by [`Orchestrator::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub scraping: JobStatus,
    pub processing: JobStatus,
}

/// Owner of both job trackers.
#[derive(Debug)]
pub struct JobRegistry {
    pub scraping: JobTracker,
    pub processing: JobTracker,
    start_gate: Mutex<()>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            scraping: JobTracker::new(JobKind::Scrape),
            processing: JobTracker::new(JobKind::Process),
            start_gate: Mutex::new(()),
        }
    }
}

impl JobRegistry {
    pub fn tracker(&self, kind: JobKind) -> &JobTracker {
        match kind {
            JobKind::Scrape => &self.scraping,
            JobKind::Process => &self.processing,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            scraping: self.scraping.snapshot(),
            processing: self.processing.snapshot(),
        }
    }

    fn claim(&self, kind: JobKind, message: &str) -> Result<(), StartError> {
        let _gate = self.start_gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.tracker(kind).try_claim(message) {
            Ok(())
        } else {
            Err(StartError::AlreadyRunning(kind))
        }
    }

    /// Claim `kind` only if no job of any kind is running.
    fn claim_exclusive(&self, kind: JobKind, message: &str) -> Result<(), StartError> {
        let _gate = self.start_gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.scraping.is_running() || self.processing.is_running() {
            return Err(StartError::Busy);
        }
        if self.tracker(kind).try_claim(message) {
            Ok(())
        } else {
            Err(StartError::Busy)
        }
    }
}

/// The two pipeline stages a job can run.
#[async_trait]
pub trait Stages: Send + Sync + 'static {
    async fn scrape(&self, job: &JobTracker) -> Result<StageOutput, PipelineError>;

    async fn process(&self, max_articles: usize, job: &JobTracker) -> Result<StageOutput, PipelineError>;
}

const SCRAPE_CLAIM_MESSAGE: &str = "Initializing scraper...";
const PROCESS_CLAIM_MESSAGE: &str = "Checking for scraped data...";

/// Starts jobs on background tasks and reports their status.
pub struct Orchestrator<S> {
    stages: Arc<S>,
    registry: Arc<JobRegistry>,
    chain_pause: Duration,
}

impl<S: Stages> Orchestrator<S> {
    /// `chain_pause` is slept between the two stages of the combined workflow.
    pub fn new(stages: S, chain_pause: Duration) -> Self {
        Self {
            stages: Arc::new(stages),
            registry: Arc::new(JobRegistry::default()),
            chain_pause,
        }
    }

    #[cfg(test)]
    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Read-only snapshot of both jobs. Never blocks on a running job.
    pub fn status(&self) -> StatusSnapshot {
        self.registry.status()
    }

    #[instrument(level = "info", skip_all)]
    pub fn start_scrape(&self) -> Result<JoinHandle<()>, StartError> {
        self.registry.claim(JobKind::Scrape, SCRAPE_CLAIM_MESSAGE)?;
        info!("Scrape job accepted");

        let stages = Arc::clone(&self.stages);
        let registry = Arc::clone(&self.registry);
        Ok(tokio::spawn(async move {
            let job = &registry.scraping;
            run_job(job, stages.scrape(job)).await;
        }))
    }

    #[instrument(level = "info", skip(self))]
    pub fn start_process(&self, max_articles: usize) -> Result<JoinHandle<()>, StartError> {
        self.registry.claim(JobKind::Process, PROCESS_CLAIM_MESSAGE)?;
        info!("Process job accepted");

        let stages = Arc::clone(&self.stages);
        let registry = Arc::clone(&self.registry);
        Ok(tokio::spawn(async move {
            let job = &registry.processing;
            run_job(job, stages.process(max_articles, job)).await;
        }))
    }

    /// Scrape, then process the fresh dataset if scraping succeeded.
    #[instrument(level = "info", skip(self))]
    pub fn start_combined(&self, max_articles: usize) -> Result<JoinHandle<()>, StartError> {
        self.registry.claim_exclusive(JobKind::Scrape, SCRAPE_CLAIM_MESSAGE)?;
        info!("Combined workflow accepted");

        let stages = Arc::clone(&self.stages);
        let registry = Arc::clone(&self.registry);
        let chain_pause = self.chain_pause;
        Ok(tokio::spawn(async move {
            let scrape = &registry.scraping;
            let scraped = run_job(scrape, stages.scrape(scrape)).await;
            if scraped.progress != 100 {
                error!(message = %scraped.message, "Scraping failed; workflow stops before processing");
                return;
            }

            sleep(chain_pause).await;

            if let Err(e) = registry.claim(JobKind::Process, PROCESS_CLAIM_MESSAGE) {
                warn!(error = %e, "Processing could not start; workflow stops after scraping");
                return;
            }
            let process = &registry.processing;
            run_job(process, stages.process(max_articles, process)).await;
            info!("Combined workflow finished");
        }))
    }
}

/// Drive a claimed job to its terminal state and return that state.
async fn run_job<F>(job: &JobTracker, work: F) -> JobStatus
where
    F: Future<Output = Result<StageOutput, PipelineError>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(output)) => {
            info!(job = %job.kind(), message = %output.message, files = ?output.files, "Job complete");
            job.succeed(output);
        }
        Ok(Err(e)) => {
            error!(job = %job.kind(), error = %e, "Job failed");
            job.fail(format!("{} failed: {e}", job.kind().title()));
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(job = %job.kind(), %reason, "Job panicked");
            job.fail(format!("{} failed: {reason}", job.kind().title()));
        }
    }
    job.snapshot()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Clone, Copy, PartialEq)]
    enum Outcome {
        Succeed,
        Fail,
        Panic,
    }

    struct FakeStages {
        scrape_outcome: Outcome,
        /// When set, the scrape stage waits for a permit before finishing.
        gate: Option<Notify>,
        scrape_calls: AtomicUsize,
        process_calls: AtomicUsize,
    }

    impl FakeStages {
        fn new(scrape_outcome: Outcome) -> Self {
            Self {
                scrape_outcome,
                gate: None,
                scrape_calls: AtomicUsize::new(0),
                process_calls: AtomicUsize::new(0),
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::new(Outcome::Succeed)
            }
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }
    }

    #[async_trait]
    impl Stages for FakeStages {
        async fn scrape(&self, job: &JobTracker) -> Result<StageOutput, PipelineError> {
            self.scrape_calls.fetch_add(1, Ordering::SeqCst);
            job.advance(10, "Scraping sources...");
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.scrape_outcome {
                Outcome::Succeed => Ok(StageOutput {
                    message: "Scraping complete! Created 3 links, 2 articles".to_string(),
                    files: vec!["a.xml".to_string(), "a.json".to_string()],
                }),
                Outcome::Fail => Err(PipelineError::MissingPrerequisite("site down".to_string())),
                Outcome::Panic => panic!("selector table corrupted"),
            }
        }

        async fn process(&self, max_articles: usize, job: &JobTracker) -> Result<StageOutput, PipelineError> {
            self.process_calls.fetch_add(1, Ordering::SeqCst);
            job.advance(30, format!("Processing up to {max_articles} articles..."));
            Ok(StageOutput {
                message: "Processing complete!".to_string(),
                files: vec!["p.json".to_string()],
            })
        }
    }

    #[test]
    fn test_job_kind_labels() {
        assert_eq!(JobKind::Scrape.to_string(), "scraping");
        assert_eq!(JobKind::Process.to_string(), "processing");
        assert_eq!(JobKind::Process.title(), "Processing");
    }

    #[test]
    fn test_progress_is_monotonic() {
        let tracker = JobTracker::new(JobKind::Process);
        assert!(tracker.try_claim("start"));
        tracker.advance(30, "thirty");
        tracker.advance(10, "late report");
        let status = tracker.snapshot();
        assert_eq!(status.progress, 30);
        assert_eq!(status.message, "late report");
        tracker.advance(250, "overflow");
        assert_eq!(tracker.snapshot().progress, 100);
    }

    #[test]
    fn test_claim_is_single_flight() {
        let tracker = JobTracker::new(JobKind::Scrape);
        assert!(tracker.try_claim("first"));
        assert!(!tracker.try_claim("second"));
        assert_eq!(tracker.snapshot().message, "first");
    }

    #[tokio::test]
    async fn test_second_scrape_rejected_until_done() {
        let orchestrator = Orchestrator::new(FakeStages::gated(), Duration::ZERO);

        let first = orchestrator.start_scrape().unwrap();
        assert_eq!(
            orchestrator.start_scrape().unwrap_err(),
            StartError::AlreadyRunning(JobKind::Scrape)
        );
        assert!(orchestrator.status().scraping.running);

        orchestrator.stages().release();
        first.await.unwrap();
        let status = orchestrator.status().scraping;
        assert!(status.is_done());
        assert!(status.last_run.is_some());
        assert_eq!(status.files_created, vec!["a.xml", "a.json"]);

        let second = orchestrator.start_scrape().unwrap();
        orchestrator.stages().release();
        second.await.unwrap();
        assert_eq!(orchestrator.stages().scrape_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_admit_exactly_one() {
        let orchestrator = Arc::new(Orchestrator::new(FakeStages::gated(), Duration::ZERO));

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move { orchestrator.start_scrape() })
            })
            .collect();

        let mut accepted = Vec::new();
        for attempt in attempts {
            if let Ok(handle) = attempt.await.unwrap() {
                accepted.push(handle);
            }
        }
        assert_eq!(accepted.len(), 1);

        orchestrator.stages().release();
        for handle in accepted {
            handle.await.unwrap();
        }
        assert_eq!(orchestrator.stages().scrape_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_stage_resets_progress() {
        let orchestrator = Orchestrator::new(FakeStages::new(Outcome::Fail), Duration::ZERO);
        orchestrator.start_scrape().unwrap().await.unwrap();

        let status = orchestrator.status().scraping;
        assert!(!status.running);
        assert_eq!(status.progress, 0);
        assert_eq!(status.message, "Scraping failed: site down");
        assert!(status.last_run.is_none());
    }

    #[tokio::test]
    async fn test_panicking_stage_is_recorded_as_failure() {
        let orchestrator = Orchestrator::new(FakeStages::new(Outcome::Panic), Duration::ZERO);
        orchestrator.start_scrape().unwrap().await.unwrap();

        let status = orchestrator.status().scraping;
        assert!(!status.running);
        assert_eq!(status.progress, 0);
        assert!(status.message.contains("selector table corrupted"));
        assert!(orchestrator.start_scrape().is_ok());
    }

    #[tokio::test]
    async fn test_combined_stops_when_scrape_fails() {
        let orchestrator = Orchestrator::new(FakeStages::new(Outcome::Fail), Duration::ZERO);
        orchestrator.start_combined(5).unwrap().await.unwrap();

        assert_eq!(orchestrator.stages().process_calls.load(Ordering::SeqCst), 0);
        let status = orchestrator.status();
        assert_eq!(status.scraping.progress, 0);
        assert_eq!(status.processing, JobStatus::idle(JobKind::Process));
    }

    #[tokio::test]
    async fn test_combined_runs_both_stages() {
        let orchestrator = Orchestrator::new(FakeStages::new(Outcome::Succeed), Duration::ZERO);
        orchestrator.start_combined(5).unwrap().await.unwrap();

        assert_eq!(orchestrator.stages().scrape_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.stages().process_calls.load(Ordering::SeqCst), 1);
        let status = orchestrator.status();
        assert!(status.scraping.is_done());
        assert!(status.processing.is_done());
        assert_eq!(status.processing.files_created, vec!["p.json"]);
    }

    #[tokio::test]
    async fn test_combined_rejected_while_any_job_runs() {
        let orchestrator = Orchestrator::new(FakeStages::gated(), Duration::ZERO);
        let scrape = orchestrator.start_scrape().unwrap();
        assert_eq!(orchestrator.start_combined(5).unwrap_err(), StartError::Busy);

        orchestrator.stages().release();
        scrape.await.unwrap();

        orchestrator.registry().processing.try_claim("held");
        assert_eq!(orchestrator.start_combined(5).unwrap_err(), StartError::Busy);
    }

    #[tokio::test]
    async fn test_observer_sees_milestones() {
        let orchestrator = Orchestrator::new(FakeStages::gated(), Duration::ZERO);
        let mut rx = orchestrator.registry().scraping.subscribe();
        let handle = orchestrator.start_scrape().unwrap();

        rx.wait_for(|s| s.progress == 10).await.unwrap();
        orchestrator.stages().release();
        let done = rx.wait_for(|s| s.is_done()).await.unwrap().clone();
        assert_eq!(done.message, "Scraping complete! Created 3 links, 2 articles");
        handle.await.unwrap();
    }
}
