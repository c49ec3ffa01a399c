use async_trait::async_trait;
use groupdesk_core::{CoreResult, JobQueue};
use groupdesk_shared::{Job, QueueName};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Job queues as Redis lists: producers RPUSH, workers LPOP.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn push(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        let depth: i64 = conn.rpush(job.queue().key(), payload).await?;
        debug!("Job {} queued on {} (depth {})", job.id(), job.queue().key(), depth);
        Ok(())
    }

    async fn pop(&self, queue: QueueName) -> StoreResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = redis::cmd("LPOP")
            .arg(queue.key())
            .query_async(&mut conn)
            .await?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn queue_depth(&self, queue: QueueName) -> Result<i64, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.llen(queue.key()).await
    }
}

#[async_trait]
impl JobQueue for RedisClient {
    async fn enqueue(&self, job: &Job) -> CoreResult<()> {
        Ok(self.push(job).await?)
    }

    async fn dequeue(&self, queue: QueueName) -> CoreResult<Option<Job>> {
        match self.pop(queue).await {
            Ok(job) => Ok(job),
            // LPOP already removed it; an unreadable payload is dropped.
            Err(StoreError::Serialization(err)) => {
                warn!("Discarding unreadable job on {}: {}", queue.key(), err);
                Ok(None)
            }
            Err(other) => Err(other.into()),
        }
    }
}
