use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::job::Job;

const KEY_PREFIX: &str = "model_gen:job";

/// Write-through cache of job snapshots in front of the registry.
///
/// The registry stays authoritative; entries outlive it only until their TTL.
#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn put(&self, job: &Job) -> Result<(), CacheError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, CacheError>;

    async fn remove(&self, id: Uuid) -> Result<(), CacheError>;

    async fn health_check(&self) -> Result<(), CacheError>;
}

fn job_key(id: Uuid) -> String {
    format!("{}:{}", KEY_PREFIX, id)
}

/// Redis-backed status cache with a fixed TTL per entry.
pub struct RedisStatusCache {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisStatusCache {
    pub fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        Ok(Self { client, ttl_secs })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn put(&self, job: &Job) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(CacheError::Serialize)?;
        conn.set_ex::<_, _, ()>(job_key(job.id), payload, self.ttl_secs)
            .await
            .map_err(CacheError::Redis)?;

        tracing::debug!(job_id = %job.id, status = %job.status, ttl = self.ttl_secs, "Job status cached");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, CacheError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(job_key(id)).await.map_err(CacheError::Redis)?;

        match payload {
            Some(payload) => {
                let job: Job = serde_json::from_str(&payload).map_err(CacheError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(job_key(id))
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }

    /// Check Redis connectivity (for health checks).
    async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
