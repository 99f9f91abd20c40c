//! In-process doubles for the orchestrator's collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use model_gen_proxy::models::job::{GenerationInput, Job, ProviderCredential};
use model_gen_proxy::services::cache::{CacheError, StatusCache};
use model_gen_proxy::services::provider::{
    GenerationClient, ProviderError, ProviderState, ProviderStatus,
};
use model_gen_proxy::services::retry::RetryPolicy;
use model_gen_proxy::services::storage::{sha256_hex, AssetStore, StorageError, StoredAsset};

type SubmitFn = Box<dyn Fn() -> Result<String, ProviderError> + Send + Sync>;
type PollFn = Box<dyn Fn() -> Result<ProviderStatus, ProviderError> + Send + Sync>;

pub fn provider_status(state: ProviderState, progress: u8, location: Option<&str>) -> ProviderStatus {
    ProviderStatus {
        state,
        progress,
        result_location: location.map(str::to_string),
        error_message: None,
    }
}

/// Scripted generation provider. Scripted outcomes are consumed in order,
/// then the fallback answers every further call.
pub struct FakeProvider {
    submit_delay: Duration,
    retry: Option<RetryPolicy>,
    submit_script: Mutex<VecDeque<Result<String, ProviderError>>>,
    submit_fallback: SubmitFn,
    poll_script: Mutex<VecDeque<Result<ProviderStatus, ProviderError>>>,
    poll_fallback: PollFn,
    download_result: Mutex<Option<Result<Vec<u8>, ProviderError>>>,
    pub submit_calls: AtomicU32,
    pub poll_calls: AtomicU32,
    pub download_calls: AtomicU32,
    pub credentials: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            submit_delay: Duration::ZERO,
            retry: None,
            submit_script: Mutex::new(VecDeque::new()),
            submit_fallback: Box::new(|| Ok("task-1".to_string())),
            poll_script: Mutex::new(VecDeque::new()),
            poll_fallback: Box::new(|| Ok(provider_status(ProviderState::Running, 50, None))),
            download_result: Mutex::new(None),
            submit_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
            download_calls: AtomicU32::new(0),
            credentials: Mutex::new(Vec::new()),
        }
    }

    /// Submit and poll go through `policy`, the way the HTTP client does.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn with_submit_fallback(
        mut self,
        f: impl Fn() -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.submit_fallback = Box::new(f);
        self
    }

    pub fn with_polls(self, polls: Vec<Result<ProviderStatus, ProviderError>>) -> Self {
        *self.poll_script.lock().unwrap() = polls.into();
        self
    }

    pub fn with_poll_fallback(
        mut self,
        f: impl Fn() -> Result<ProviderStatus, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.poll_fallback = Box::new(f);
        self
    }

    pub fn with_download(self, result: Result<Vec<u8>, ProviderError>) -> Self {
        *self.download_result.lock().unwrap() = Some(result);
        self
    }

    fn next_submit(&self) -> Result<String, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.submit_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| (self.submit_fallback)())
    }

    fn next_poll(&self) -> Result<ProviderStatus, ProviderError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.poll_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| (self.poll_fallback)())
    }
}

#[async_trait]
impl GenerationClient for FakeProvider {
    async fn submit(
        &self,
        _input: &GenerationInput,
        credential: &ProviderCredential,
    ) -> Result<String, ProviderError> {
        self.credentials
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        match &self.retry {
            Some(policy) => policy
                .run("submit", move || async move { self.next_submit() })
                .await
                .map_err(ProviderError::from),
            None => self.next_submit(),
        }
    }

    async fn poll(
        &self,
        _provider_job_id: &str,
        _credential: &ProviderCredential,
    ) -> Result<ProviderStatus, ProviderError> {
        match &self.retry {
            Some(policy) => policy
                .run("poll", move || async move { self.next_poll() })
                .await
                .map_err(ProviderError::from),
            None => self.next_poll(),
        }
    }

    async fn download(&self, _location: &str) -> Result<Vec<u8>, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.download_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(b"glTF\x02\x00\x00\x00fake-model".to_vec()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
}

pub struct FakeStore {
    pub fail_uploads: bool,
    pub integrity_ok: bool,
    pub uploads: Mutex<Vec<Upload>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            fail_uploads: false,
            integrity_ok: true,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for FakeStore {
    async fn upload(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        mime_type: &str,
    ) -> Result<StoredAsset, StorageError> {
        if self.fail_uploads {
            return Err(StorageError::Status {
                status: 503,
                key: suggested_name.to_string(),
            });
        }

        self.uploads.lock().unwrap().push(Upload {
            name: suggested_name.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len(),
        });

        let key = format!("models/{}", suggested_name);
        Ok(StoredAsset {
            url: format!("https://cdn.test/{}", key),
            key,
            checksum: sha256_hex(bytes),
            size: bytes.len() as u64,
        })
    }

    async fn verify_integrity(&self, _key: &str, _expected_size: u64) -> bool {
        self.integrity_ok
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Status cache that keeps every snapshot it was handed.
#[derive(Default)]
pub struct RecordingCache {
    entries: Mutex<HashMap<Uuid, Job>>,
    history: Mutex<Vec<Job>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots written for `id`, oldest first.
    pub fn history(&self, id: Uuid) -> Vec<Job> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.id == id)
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.lock().unwrap().contains_key(&id)
    }
}

#[async_trait]
impl StatusCache for RecordingCache {
    async fn put(&self, job: &Job) -> Result<(), CacheError> {
        self.entries.lock().unwrap().insert(job.id, job.clone());
        self.history.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, CacheError> {
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }

    async fn remove(&self, id: Uuid) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
