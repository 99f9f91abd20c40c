//! Job lifecycle orchestration.
//!
//! Every accepted job gets one task, spawned at submission, that walks it
//! through `submit -> poll -> download -> upload -> finalize`. That task is
//! the only writer of its job; readers go through the [`StatusCache`] and
//! the [`JobRegistry`]. All tasks share one [`CancellationToken`] so
//! [`Orchestrator::shutdown`] can stop them and wait for them to unwind.

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::models::job::{
    ErrorInfo, GenerationInput, Job, JobErrorCode, JobStatus, ProviderCredential, TransitionError,
};
use crate::services::cache::StatusCache;
use crate::services::provider::{GenerationClient, ProviderState};
use crate::services::registry::{JobRegistry, RegistryError};
use crate::services::storage::AssetStore;
use crate::services::validation::{validate_input, InputLimits, ValidationError};

const PROGRESS_SUBMITTED: u8 = 20;
const PROGRESS_POLL_CEILING: u8 = 80;
const PROGRESS_FINALIZING: u8 = 85;

/// Poll interval growth after a non-terminal status.
const POLL_GROWTH: f64 = 1.2;
/// Poll interval growth after a failed status query.
const POLL_ERROR_GROWTH: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Wall-clock budget from submission to a terminal state.
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_max_interval: Duration,
    pub poll_max_attempts: u32,
    /// How long terminal jobs are kept before eviction.
    pub retention: Duration,
    pub shutdown_grace: Duration,
    pub limits: InputLimits,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            poll_max_interval: Duration::from_secs(30),
            poll_max_attempts: 60,
            retention: Duration::from_secs(24 * 3_600),
            shutdown_grace: Duration::from_secs(30),
            limits: InputLimits::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Map provider progress (0-100) onto the polling band of job progress.
pub fn scaled_progress(provider_progress: u8) -> u8 {
    let scaled = f64::from(PROGRESS_SUBMITTED) + f64::from(provider_progress.min(100)) * 0.6;
    (scaled as u8).min(PROGRESS_POLL_CEILING)
}

fn grow(interval: Duration, factor: f64, max: Duration) -> Duration {
    interval.mul_f64(factor).min(max)
}

/// Storage name and content type for a downloaded model, based on the
/// extension of its provider location.
pub fn asset_name(job_id: Uuid, location: &str) -> (String, &'static str) {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    let ext = match file.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => "glb".to_string(),
    };

    let mime = match ext.as_str() {
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "obj" => "model/obj",
        "usdz" => "model/vnd.usdz+zip",
        _ => "application/octet-stream",
    };

    (format!("model_{}.{}", job_id, ext), mime)
}

/// Drives generation jobs from submission to a terminal state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn GenerationClient>,
    store: Arc<dyn AssetStore>,
    registry: Arc<JobRegistry>,
    cache: Option<Arc<dyn StatusCache>>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
    tasks: TaskTracker,
    running_jobs: AtomicUsize,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        store: Arc<dyn AssetStore>,
        registry: Arc<JobRegistry>,
        cache: Option<Arc<dyn StatusCache>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                registry,
                cache,
                settings,
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
                running_jobs: AtomicUsize::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// Number of jobs whose lifecycle task is still running.
    pub fn in_flight(&self) -> usize {
        self.inner.running_jobs.load(Ordering::SeqCst)
    }

    /// Validate and accept a generation request. Returns as soon as the job is
    /// recorded as `pending`; all provider traffic happens on the job's task.
    pub async fn submit(
        &self,
        input: GenerationInput,
        credential: ProviderCredential,
    ) -> Result<Uuid, SubmitError> {
        if self.inner.cancel.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }
        validate_input(&input, &self.inner.settings.limits)?;

        let job = Job::new(input.kind());
        let job_id = job.id;
        self.inner.registry.create(job).await?;

        tracing::info!(job_id = %job_id, kind = %input.kind(), "Generation job created");
        metrics::counter!("generation_jobs_submitted_total", "kind" => input.kind().to_string())
            .increment(1);

        let inner = Arc::clone(&self.inner);
        self.inner.running_jobs.fetch_add(1, Ordering::SeqCst);
        self.inner.tasks.spawn(async move {
            inner.run(job_id, input, credential).await;
        });

        Ok(job_id)
    }

    /// Latest known state of a job: cache first, registry on a miss.
    ///
    /// Cache entries can outlive the process that wrote them. A cached job
    /// that is not terminal is only served while the registry still tracks it.
    pub async fn status(&self, job_id: Uuid) -> Option<Job> {
        if let Some(cache) = &self.inner.cache {
            match cache.get(job_id).await {
                Ok(Some(job)) if job.is_terminal() => return Some(job),
                Ok(Some(job)) => {
                    if self.inner.registry.get(job_id).await.is_some() {
                        return Some(job);
                    }
                    tracing::debug!(job_id = %job_id, "Ignoring cached job no longer tracked");
                    return None;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Status cache read failed, using registry");
                }
            }
        }
        self.inner.registry.get(job_id).await
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        self.inner.registry.list_all().await
    }

    /// Drop terminal jobs older than the retention period. Returns how many were evicted.
    pub async fn evict_expired(&self) -> usize {
        let retention = match chrono::Duration::from_std(self.inner.settings.retention) {
            Ok(retention) => retention,
            Err(_) => return 0,
        };

        let evicted = self.inner.registry.evict_expired(retention, Utc::now()).await;
        for job_id in &evicted {
            if let Some(cache) = &self.inner.cache {
                if let Err(e) = cache.remove(*job_id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to drop evicted job from cache");
                }
            }
            tracing::info!(job_id = %job_id, "Evicted expired job");
        }

        metrics::counter!("jobs_evicted_total").increment(evicted.len() as u64);
        evicted.len()
    }

    /// Run the retention sweep every `interval` until shutdown.
    pub fn spawn_eviction_sweep(&self, interval: Duration) {
        let orchestrator = self.clone();
        let cancel = self.inner.cancel.clone();

        self.inner.tasks.spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                retention_secs = orchestrator.settings().retention.as_secs(),
                "Job eviction sweep started"
            );

            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Job eviction sweep stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = orchestrator.evict_expired().await;
                        if evicted > 0 {
                            tracing::info!(evicted, "Eviction sweep purged expired jobs");
                        } else {
                            tracing::debug!("Eviction sweep: nothing to purge");
                        }
                    }
                }
            }
        });
    }

    /// Cancel every job task and wait up to the grace period for them to exit.
    /// Cancelled jobs keep their last observed state. Returns `false` if the
    /// grace period ran out first.
    pub async fn shutdown(&self) -> bool {
        tracing::info!(tasks = self.inner.tasks.len(), "Shutting down orchestrator");
        self.inner.cancel.cancel();
        self.inner.tasks.close();

        match tokio::time::timeout(self.inner.settings.shutdown_grace, self.inner.tasks.wait()).await {
            Ok(()) => {
                tracing::info!("All job tasks stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.inner.tasks.len(),
                    "Shutdown grace period elapsed with tasks still running"
                );
                false
            }
        }
    }
}

impl Inner {
    async fn run(&self, job_id: Uuid, input: GenerationInput, credential: ProviderCredential) {
        metrics::gauge!("generation_jobs_in_flight").increment(1.0);
        let started = Instant::now();
        let deadline = started + self.settings.job_timeout;

        if let Some(job) = self.registry.get(job_id).await {
            self.publish(&job).await;
        }

        self.drive(job_id, &input, &credential, deadline).await;

        metrics::gauge!("generation_jobs_in_flight").decrement(1.0);
        self.running_jobs.fetch_sub(1, Ordering::SeqCst);
        metrics::histogram!("generation_job_duration_seconds").record(started.elapsed().as_secs_f64());
    }

    async fn drive(
        &self,
        job_id: Uuid,
        input: &GenerationInput,
        credential: &ProviderCredential,
        deadline: Instant,
    ) {
        let Some(provider_job_id) = self.submit_to_provider(job_id, input, credential, deadline).await
        else {
            return;
        };

        let Some(location) = self
            .poll_until_ready(job_id, &provider_job_id, credential, deadline)
            .await
        else {
            return;
        };

        self.finalize(job_id, &location).await;
    }

    /// Submission sequence: `pending -> processing`, or `failed`.
    async fn submit_to_provider(
        &self,
        job_id: Uuid,
        input: &GenerationInput,
        credential: &ProviderCredential,
        deadline: Instant,
    ) -> Option<String> {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::info!(job_id = %job_id, "Job cancelled during submission");
                return None;
            }
            _ = tokio::time::sleep_until(deadline) => {
                self.fail(
                    job_id,
                    JobErrorCode::GenerationTimeout,
                    format!("submission did not finish within {}s", self.settings.job_timeout.as_secs()),
                )
                .await;
                return None;
            }
            result = self.client.submit(input, credential) => result,
        };

        match result {
            Ok(provider_job_id) => {
                let accepted = provider_job_id.clone();
                self.apply(job_id, move |job| job.start_processing(accepted, PROGRESS_SUBMITTED))
                    .await?;
                tracing::info!(job_id = %job_id, provider_job_id = %provider_job_id, "Provider accepted job");
                Some(provider_job_id)
            }
            Err(e) => {
                self.fail(job_id, e.job_error_code(), format!("submission failed: {}", e))
                    .await;
                None
            }
        }
    }

    /// Poll the provider until it reports a result, a failure, or the job runs
    /// out of time or attempts.
    async fn poll_until_ready(
        &self,
        job_id: Uuid,
        provider_job_id: &str,
        credential: &ProviderCredential,
        deadline: Instant,
    ) -> Option<String> {
        let settings = &self.settings;
        let mut interval = settings.poll_interval;
        let mut attempts = 0u32;
        let mut last_state: Option<ProviderState> = None;
        let mut last_poll_error: Option<(JobErrorCode, String)> = None;

        loop {
            if Instant::now() >= deadline {
                self.fail(
                    job_id,
                    JobErrorCode::GenerationTimeout,
                    format!("no result within {}s", settings.job_timeout.as_secs()),
                )
                .await;
                return None;
            }
            if attempts >= settings.poll_max_attempts {
                // A budget spent on failing queries reports the query failure.
                let (code, message) = match last_poll_error.take() {
                    Some((code, error)) => (
                        code,
                        format!("no result after {} status checks; last error: {}", attempts, error),
                    ),
                    None => (
                        JobErrorCode::GenerationTimeout,
                        format!("no result after {} status checks", attempts),
                    ),
                };
                self.fail(job_id, code, message).await;
                return None;
            }
            attempts += 1;

            let polled = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(job_id = %job_id, "Job cancelled while polling");
                    return None;
                }
                // Deadline is enforced at the top of the loop.
                _ = tokio::time::sleep_until(deadline) => continue,
                polled = self.client.poll(provider_job_id, credential) => polled,
            };

            let wait = match polled {
                Ok(status) => {
                    last_poll_error = None;
                    self.apply(job_id, |job| job.record_progress(scaled_progress(status.progress)))
                        .await?;

                    if last_state != Some(status.state) {
                        tracing::info!(
                            job_id = %job_id,
                            provider_job_id,
                            state = ?status.state,
                            progress = status.progress,
                            "Provider state changed"
                        );
                        last_state = Some(status.state);
                    }

                    match status.state {
                        ProviderState::Succeeded => {
                            return match status.result_location {
                                Some(location) => Some(location),
                                None => {
                                    self.fail(
                                        job_id,
                                        JobErrorCode::MissingResult,
                                        "provider reported success without a model location",
                                    )
                                    .await;
                                    None
                                }
                            };
                        }
                        ProviderState::Failed => {
                            let message = status
                                .error_message
                                .unwrap_or_else(|| "provider reported generation failure".to_string());
                            self.fail(job_id, JobErrorCode::GenerationFailed, message).await;
                            return None;
                        }
                        ProviderState::Queued | ProviderState::Running => {
                            let wait = interval;
                            interval = grow(interval, POLL_GROWTH, settings.poll_max_interval);
                            wait
                        }
                    }
                }
                Err(e) if e.is_permanent() => {
                    self.fail(job_id, e.job_error_code(), format!("status query failed: {}", e))
                        .await;
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt = attempts,
                        max_attempts = settings.poll_max_attempts,
                        error = %e,
                        "Status poll failed"
                    );
                    last_poll_error = Some((e.job_error_code(), e.to_string()));
                    let wait = interval;
                    interval = grow(interval, POLL_ERROR_GROWTH, settings.poll_max_interval);
                    wait
                }
            };

            let wait = wait.min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(job_id = %job_id, "Job cancelled while polling");
                    return None;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Download the finished model and move it to durable storage. Runs at
    /// most once per job and is not interrupted by cancellation.
    async fn finalize(&self, job_id: Uuid, location: &str) {
        if self
            .apply(job_id, |job| job.record_progress(PROGRESS_FINALIZING))
            .await
            .is_none()
        {
            return;
        }

        tracing::info!(job_id = %job_id, location, "Downloading generated model");
        let bytes = match self.client.download(location).await {
            Ok(bytes) if bytes.is_empty() => {
                self.fail(job_id, JobErrorCode::DownloadFailed, "provider returned an empty model")
                    .await;
                return;
            }
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(job_id, JobErrorCode::DownloadFailed, format!("model download failed: {}", e))
                    .await;
                return;
            }
        };

        let (name, mime_type) = asset_name(job_id, location);
        let stored = match self.store.upload(&bytes, &name, mime_type).await {
            Ok(stored) => stored,
            Err(e) => {
                self.fail(job_id, JobErrorCode::UploadFailed, format!("model upload failed: {}", e))
                    .await;
                return;
            }
        };

        if !self.store.verify_integrity(&stored.key, stored.size).await {
            tracing::warn!(
                job_id = %job_id,
                key = %stored.key,
                size = stored.size,
                "Integrity check failed after upload; completion stands"
            );
        }

        let url = stored.url.clone();
        if self.apply(job_id, move |job| job.complete(url)).await.is_some() {
            tracing::info!(
                job_id = %job_id,
                result_url = %stored.url,
                key = %stored.key,
                checksum = %stored.checksum,
                "Generation job completed"
            );
            metrics::counter!("generation_jobs_completed_total").increment(1);
        }
    }

    async fn fail(&self, job_id: Uuid, code: JobErrorCode, message: impl Into<String>) {
        let error = ErrorInfo::new(code, message);
        let reason = error.message.clone();
        if self.apply(job_id, move |job| job.fail(error)).await.is_some() {
            tracing::error!(job_id = %job_id, code = %code, reason = %reason, "Generation job failed");
            metrics::counter!("generation_jobs_failed_total", "code" => code.to_string()).increment(1);
        }
    }

    /// Mutate the job in the registry, then refresh its cache entry.
    async fn apply<F>(&self, job_id: Uuid, change: F) -> Option<Job>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut previous: Option<JobStatus> = None;
        let result = self
            .registry
            .update(job_id, |job| {
                previous = Some(job.status);
                change(job)
            })
            .await;

        match result {
            Ok(job) => {
                if let Some(from) = previous.filter(|from| *from != job.status) {
                    tracing::info!(
                        job_id = %job_id,
                        from = %from,
                        to = %job.status,
                        progress = job.progress,
                        "Job state transition"
                    );
                }
                self.publish(&job).await;
                Some(job)
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Job update rejected");
                None
            }
        }
    }

    async fn publish(&self, job: &Job) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.put(job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to refresh status cache");
            // A stale entry would shadow the registry until it expires.
            if let Err(e) = cache.remove(job.id).await {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to drop stale cache entry");
            }
        }
    }
}
