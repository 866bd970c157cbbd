//! In-memory job registry for asynchronous pipeline runs.
//!
//! Lifecycle: `Created → Running → {Completed, Failed}`. Active jobs sit
//! behind a per-job mutex written only by the run's progress observer. On a
//! terminal transition the entry is replaced by an immutable `Arc`, so
//! reads of finished jobs take no job lock. A run that panics ends its
//! job as `Failed`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use openkeywords_shared::{
    CompanyContext, JobId, JobStatus, OpenKeywordsError, Result, Stage, StageOutcome,
};

use crate::export::{self, ExportFormat};
use crate::pipeline::{PipelineConfig, PipelineOrchestrator, PipelineResult, ProgressReporter};

/// One pipeline run as seen by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: JobId,
    pub status: JobStatus,
    pub company: CompanyContext,
    pub config: PipelineConfig,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Stage currently executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    #[serde(default)]
    pub stages: Vec<StageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    /// Reason a failed job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineJob {
    fn new(company: CompanyContext, config: PipelineConfig) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Created,
            company,
            config,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            current_stage: None,
            stages: Vec::new(),
            result: None,
            error: None,
        }
    }
}

enum JobEntry {
    Active {
        job: Arc<Mutex<PipelineJob>>,
        cancel: Arc<AtomicBool>,
        done: watch::Receiver<bool>,
    },
    Terminal(Arc<PipelineJob>),
}

impl JobEntry {
    fn snapshot(&self) -> Arc<PipelineJob> {
        match self {
            Self::Active { job, .. } => Arc::new(lock(job).clone()),
            Self::Terminal(job) => Arc::clone(job),
        }
    }

    fn status(&self) -> JobStatus {
        match self {
            Self::Active { job, .. } => lock(job).status,
            Self::Terminal(job) => job.status,
        }
    }
}

fn lock(job: &Mutex<PipelineJob>) -> MutexGuard<'_, PipelineJob> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}

type Registry = RwLock<HashMap<JobId, JobEntry>>;

/// Failure reason recorded when a run ends without producing an outcome.
const RUN_ABORTED: &str = "run aborted";

/// Tracks pipeline runs by id.
#[derive(Clone)]
pub struct JobManager {
    orchestrator: PipelineOrchestrator,
    jobs: Arc<Registry>,
    max_age: Duration,
    max_jobs: usize,
}

impl JobManager {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            max_age: Duration::from_secs(24 * 3600),
            max_jobs: 1000,
        }
    }

    /// Retention limits applied whenever a job is submitted.
    pub fn with_retention(mut self, max_age: Duration, max_jobs: usize) -> Self {
        self.max_age = max_age;
        self.max_jobs = max_jobs;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            warn!("job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            warn!("job registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register a run and start it on the tokio runtime.
    ///
    /// Must be called from within a runtime.
    #[instrument(skip_all, fields(company = %company.name))]
    pub fn submit(&self, company: CompanyContext, config: PipelineConfig) -> JobId {
        // leave room for the job about to be inserted
        self.prune(self.max_age, self.max_jobs.saturating_sub(1));

        let job = PipelineJob::new(company.clone(), config.clone());
        let id = job.id;
        let job = Arc::new(Mutex::new(job));
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);

        self.write().insert(
            id,
            JobEntry::Active {
                job: Arc::clone(&job),
                cancel: Arc::clone(&cancel),
                done: done_rx,
            },
        );
        info!(%id, "job submitted");

        let orchestrator = self.orchestrator.clone();
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            {
                let mut j = lock(&job);
                j.status = JobStatus::Running;
                j.started_at = Some(Utc::now());
            }

            let observer = JobObserver {
                job: Arc::clone(&job),
                cancel,
            };
            let outcome = AssertUnwindSafe(orchestrator.run(&company, &config, &observer))
                .catch_unwind()
                .await;

            let mut finished = lock(&job).clone();
            finished.current_stage = None;
            finished.finished_at = Some(Utc::now());
            match outcome {
                Ok(Ok(result)) => {
                    finished.status = JobStatus::Completed;
                    finished.stages = result.stages.clone();
                    finished.result = Some(result);
                    info!(%id, "job completed");
                }
                Ok(Err(err)) => {
                    finished.status = JobStatus::Failed;
                    finished.error = Some(err.to_string());
                    warn!(%id, error = %err, "job failed");
                }
                Err(_) => {
                    finished.status = JobStatus::Failed;
                    finished.error = Some(RUN_ABORTED.to_string());
                    warn!(%id, "job run panicked");
                }
            }

            mark_terminal(&jobs, id, finished);
            let _ = done_tx.send(true);
        });

        id
    }

    /// Current snapshot of a job.
    pub fn get(&self, id: JobId) -> Result<Arc<PipelineJob>> {
        self.read()
            .get(&id)
            .map(JobEntry::snapshot)
            .ok_or(OpenKeywordsError::JobNotFound(id))
    }

    /// Jobs newest first, at most `limit`.
    pub fn list(&self, limit: usize) -> Vec<Arc<PipelineJob>> {
        let registry = self.read();
        let mut ids: Vec<JobId> = registry.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.into_iter()
            .take(limit)
            .filter_map(|id| registry.get(&id).map(JobEntry::snapshot))
            .collect()
    }

    /// Remove a finished job.
    pub fn delete(&self, id: JobId) -> Result<()> {
        let mut registry = self.write();
        let status = registry
            .get(&id)
            .map(JobEntry::status)
            .ok_or(OpenKeywordsError::JobNotFound(id))?;
        if !status.is_terminal() {
            return Err(OpenKeywordsError::InvalidJobState { id, status });
        }
        registry.remove(&id);
        info!(%id, "job deleted");
        Ok(())
    }

    /// Ask an active job to stop before its next stage.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        match self.read().get(&id) {
            None => Err(OpenKeywordsError::JobNotFound(id)),
            Some(JobEntry::Terminal(job)) => Err(OpenKeywordsError::InvalidJobState {
                id,
                status: job.status,
            }),
            Some(JobEntry::Active { cancel, .. }) => {
                cancel.store(true, Ordering::SeqCst);
                info!(%id, "job cancellation requested");
                Ok(())
            }
        }
    }

    /// Render a completed job's result.
    pub fn export(&self, id: JobId, format: ExportFormat) -> Result<String> {
        let job = self.get(id)?;
        match (&job.status, &job.result) {
            (JobStatus::Completed, Some(result)) => export::render(result, format),
            (status, _) => Err(OpenKeywordsError::InvalidJobState {
                id,
                status: *status,
            }),
        }
    }

    /// Drop terminal jobs older than `max_age`, then the oldest terminal
    /// jobs while the registry holds more than `max_jobs`. Returns how many
    /// were removed.
    pub fn prune(&self, max_age: Duration, max_jobs: usize) -> usize {
        let now = Utc::now();
        let mut registry = self.write();
        let before = registry.len();

        registry.retain(|_, entry| match entry {
            JobEntry::Terminal(job) => {
                let finished = job.finished_at.unwrap_or(job.created_at);
                (now - finished).to_std().unwrap_or_default() < max_age
            }
            JobEntry::Active { .. } => true,
        });

        if registry.len() > max_jobs {
            let mut terminal: Vec<JobId> = registry
                .iter()
                .filter(|(_, e)| matches!(e, JobEntry::Terminal(_)))
                .map(|(id, _)| *id)
                .collect();
            terminal.sort_unstable();
            let excess = registry.len() - max_jobs;
            for id in terminal.into_iter().take(excess) {
                registry.remove(&id);
            }
        }

        let removed = before - registry.len();
        if removed > 0 {
            info!(removed, "pruned finished jobs");
        }
        removed
    }

    /// Wait until a job reaches a terminal state.
    pub async fn wait(&self, id: JobId) -> Result<Arc<PipelineJob>> {
        let done = match self.read().get(&id) {
            None => return Err(OpenKeywordsError::JobNotFound(id)),
            Some(JobEntry::Terminal(job)) => return Ok(Arc::clone(job)),
            Some(JobEntry::Active { done, .. }) => done.clone(),
        };
        let mut done = done;
        // A dropped sender means the task ended, possibly without recording
        // an outcome.
        let _ = done.wait_for(|finished| *finished).await;
        self.fail_if_active(id);
        self.get(id)
    }

    /// Turn an entry whose run is gone into a failed terminal job.
    fn fail_if_active(&self, id: JobId) {
        let stale = match self.read().get(&id) {
            Some(JobEntry::Active { job, .. }) => {
                let mut job = lock(job).clone();
                job.status = JobStatus::Failed;
                job.current_stage = None;
                job.finished_at = Some(Utc::now());
                job.error = Some(RUN_ABORTED.to_string());
                job
            }
            _ => return,
        };
        warn!(%id, "job run ended without an outcome");
        mark_terminal(&self.jobs, id, stale);
    }
}

/// Replace a job's entry with its final record, unless it was removed.
fn mark_terminal(jobs: &Registry, id: JobId, finished: PipelineJob) {
    let mut registry = jobs.write().unwrap_or_else(PoisonError::into_inner);
    let active = registry
        .get_mut(&id)
        .filter(|entry| matches!(entry, JobEntry::Active { .. }));
    if let Some(entry) = active {
        *entry = JobEntry::Terminal(Arc::new(finished));
    }
}

/// Mirrors stage progress into the job record and relays cancellation.
struct JobObserver {
    job: Arc<Mutex<PipelineJob>>,
    cancel: Arc<AtomicBool>,
}

impl ProgressReporter for JobObserver {
    fn stage_started(&self, stage: Stage) {
        lock(&self.job).current_stage = Some(stage);
    }

    fn stage_finished(&self, outcome: &StageOutcome) {
        lock(&self.job).stages.push(outcome.clone());
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::RetryPolicy;
    use crate::testing::{ScriptedAi, prompt_keywords};
    use openkeywords_shared::{AiError, AiTask, StageStatus};
    use serde_json::json;

    fn company() -> CompanyContext {
        CompanyContext {
            name: "Acme".into(),
            industry: "B2B SaaS".into(),
            ..Default::default()
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            enable_clustering: false,
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        }
    }

    fn happy_ai() -> Arc<ScriptedAi> {
        let ai = ScriptedAi::new();
        ai.respond(AiTask::Generation, |_| {
            Ok(json!({"keywords": [
                {"keyword": "crm pricing plans", "intent": "commercial"},
                {"keyword": "crm demo booking", "intent": "transactional"}
            ]}))
        });
        ai.respond(AiTask::Scoring, |req| {
            let scores: Vec<_> = prompt_keywords(req)
                .iter()
                .map(|k| json!({"keyword": k, "score": 80}))
                .collect();
            Ok(json!({ "scores": scores }))
        });
        ai
    }

    fn manager(ai: Arc<ScriptedAi>) -> JobManager {
        JobManager::new(PipelineOrchestrator::new(ai))
    }

    #[tokio::test]
    async fn submitted_job_completes() {
        let jobs = manager(happy_ai());
        let id = jobs.submit(company(), config());

        let job = jobs.wait(id).await.expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());
        assert!(job.current_stage.is_none());
        let result = job.result.as_ref().expect("result");
        assert_eq!(result.keywords.len(), 2);
        assert_eq!(job.stages.len(), 7);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn failed_generation_fails_the_job() {
        let ai = ScriptedAi::new();
        ai.respond(AiTask::Generation, |_| Err(AiError::Unknown("quota".into())));
        let jobs = manager(ai);

        let id = jobs.submit(company(), config());
        let job = jobs.wait(id).await.expect("job");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.is_none());
        assert_eq!(
            job.error.as_deref(),
            Some("generation stage failed: quota")
        );
        let generation = job.stages.iter().find(|s| s.stage == Stage::Generation);
        assert_eq!(generation.map(|s| s.status), Some(StageStatus::Failed));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let jobs = manager(happy_ai());
        let id = JobId::new();
        assert!(matches!(jobs.get(id), Err(OpenKeywordsError::JobNotFound(_))));
        assert!(matches!(jobs.delete(id), Err(OpenKeywordsError::JobNotFound(_))));
        assert!(matches!(jobs.cancel(id), Err(OpenKeywordsError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn delete_requires_terminal_state() {
        let ai = happy_ai();
        // hold generation until released so the job stays active
        let gate = Arc::new(tokio::sync::Notify::new());
        let jobs = JobManager::new(PipelineOrchestrator::new(Arc::new(GatedAi {
            inner: ai,
            gate: Arc::clone(&gate),
        })));

        let id = jobs.submit(company(), config());
        let err = jobs.delete(id).unwrap_err();
        assert!(matches!(err, OpenKeywordsError::InvalidJobState { .. }));
        assert!(matches!(
            jobs.export(id, ExportFormat::Json),
            Err(OpenKeywordsError::InvalidJobState { .. })
        ));

        gate.notify_one();
        let job = jobs.wait(id).await.expect("job");
        assert_eq!(job.status, JobStatus::Completed);

        jobs.delete(id).expect("delete terminal job");
        assert!(jobs.get(id).is_err());
    }

    #[tokio::test]
    async fn cancel_stops_between_stages() {
        let ai = happy_ai();
        let gate = Arc::new(tokio::sync::Notify::new());
        let jobs = JobManager::new(PipelineOrchestrator::new(Arc::new(GatedAi {
            inner: ai.clone(),
            gate: Arc::clone(&gate),
        })));

        let id = jobs.submit(company(), config());
        while jobs.get(id).expect("job").current_stage != Some(Stage::Generation) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        jobs.cancel(id).expect("cancel active job");
        // the in-flight generation call is allowed to finish
        gate.notify_one();

        let job = jobs.wait(id).await.expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("cancelled"));
        assert!(job.result.is_none());
        assert_eq!(job.stages.last().map(|s| s.stage), Some(Stage::Generation));
        assert_eq!(ai.calls(AiTask::Generation), 1);
        assert_eq!(ai.calls(AiTask::Scoring), 0);

        assert!(matches!(
            jobs.cancel(id),
            Err(OpenKeywordsError::InvalidJobState {
                status: JobStatus::Failed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn export_completed_job() {
        let jobs = manager(happy_ai());
        let id = jobs.submit(company(), config());
        jobs.wait(id).await.expect("job");

        let csv = jobs.export(id, ExportFormat::Csv).expect("csv");
        assert!(csv.starts_with("keyword,intent,score"));
        assert!(csv.contains("crm pricing plans,commercial,80,Uncategorized"));

        let json = jobs.export(id, ExportFormat::Json).expect("json");
        assert!(json.contains("\"statistics\""));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let jobs = manager(happy_ai());
        let first = jobs.submit(company(), config());
        let second = jobs.submit(company(), config());
        let third = jobs.submit(company(), config());
        for id in [first, second, third] {
            jobs.wait(id).await.expect("job");
        }

        let ids: Vec<_> = jobs.list(2).iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![third, second]);
        assert_eq!(jobs.list(10).len(), 3);
    }

    #[tokio::test]
    async fn prune_removes_old_then_excess_terminal_jobs() {
        let jobs = manager(happy_ai());
        let ids: Vec<_> = (0..3).map(|_| jobs.submit(company(), config())).collect();
        for id in &ids {
            jobs.wait(*id).await.expect("job");
        }

        assert_eq!(jobs.prune(Duration::from_secs(3600), 10), 0);
        assert_eq!(jobs.prune(Duration::from_secs(3600), 1), 2);
        let remaining: Vec<_> = jobs.list(10).iter().map(|j| j.id).collect();
        assert_eq!(remaining, vec![ids[2]]);

        assert_eq!(jobs.prune(Duration::ZERO, 10), 1);
        assert!(jobs.list(10).is_empty());
    }

    #[tokio::test]
    async fn concurrent_jobs_do_not_interfere() {
        let ai = happy_ai();
        let jobs = manager(ai.clone());
        let ids: Vec<_> = (0..5).map(|_| jobs.submit(company(), config())).collect();

        for id in &ids {
            let job = jobs.wait(*id).await.expect("job");
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.id, *id);
        }
        assert_eq!(ai.calls(AiTask::Generation), 5);
    }

    #[tokio::test]
    async fn panicking_run_fails_the_job() {
        let jobs = JobManager::new(PipelineOrchestrator::new(Arc::new(PanickingAi)));
        let id = jobs.submit(company(), config());

        let job = jobs.wait(id).await.expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("run aborted"));
        assert!(job.finished_at.is_some());
        assert!(job.current_stage.is_none());

        assert_eq!(jobs.prune(Duration::ZERO, 10), 1);
        assert!(matches!(jobs.get(id), Err(OpenKeywordsError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn panicked_job_can_be_deleted() {
        let jobs = JobManager::new(PipelineOrchestrator::new(Arc::new(PanickingAi)));
        let id = jobs.submit(company(), config());
        jobs.wait(id).await.expect("job");
        jobs.delete(id).expect("delete failed job");
    }

    #[tokio::test]
    async fn submit_keeps_registry_within_max_jobs() {
        let jobs = manager(happy_ai()).with_retention(Duration::from_secs(3600), 2);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = jobs.submit(company(), config());
            jobs.wait(id).await.expect("job");
            ids.push(id);
            assert!(jobs.list(10).len() <= 2);
        }

        let remaining: Vec<_> = jobs.list(10).iter().map(|j| j.id).collect();
        assert_eq!(remaining, vec![ids[3], ids[2]]);
    }

    /// Panics on every call.
    struct PanickingAi;

    #[async_trait::async_trait]
    impl openkeywords_shared::AiCapability for PanickingAi {
        async fn generate(
            &self,
            _request: openkeywords_shared::AiRequest,
        ) -> std::result::Result<serde_json::Value, AiError> {
            panic!("provider bug");
        }
    }

    /// Blocks generation calls until the gate opens.
    struct GatedAi {
        inner: Arc<ScriptedAi>,
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl openkeywords_shared::AiCapability for GatedAi {
        async fn generate(
            &self,
            request: openkeywords_shared::AiRequest,
        ) -> std::result::Result<serde_json::Value, AiError> {
            if request.task == AiTask::Generation {
                self.gate.notified().await;
            }
            self.inner.generate(request).await
        }
    }
}
