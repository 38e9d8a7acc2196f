use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::pipeline::PipelineJob;

const QUEUE_KEY: &str = "video_pipeline:jobs";
const PROCESSING_KEY: &str = "video_pipeline:processing";
const DELAYED_KEY: &str = "video_pipeline:delayed";

/// Max delayed jobs promoted per dequeue.
const PROMOTE_BATCH: isize = 50;

/// Envelope serialized into the queue. The delivery id keeps payloads unique
/// so acknowledging one delivery never removes a sibling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub delivery_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub job: PipelineJob,
}

impl QueuedJob {
    pub fn new(job: PipelineJob) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            job,
        }
    }
}

/// At-least-once transport for pipeline jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError>;

    /// Make the job visible only after `delay`.
    async fn enqueue_delayed(&self, job: &PipelineJob, delay: Duration) -> Result<(), QueueError>;

    /// Take the next ready job and hold it as in-flight until `complete`.
    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledge a delivery.
    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Move every in-flight delivery back to the ready list. Returns the count.
    async fn recover_in_flight(&self) -> Result<u64, QueueError>;

    async fn queue_depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed queue: ready list, processing list and a sorted set of
/// delayed deliveries scored by their due time in milliseconds.
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    async fn push(&self, envelope: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(envelope).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Move due delayed jobs onto the ready list. ZREM decides the winner when
    /// several workers promote concurrently.
    async fn promote_due(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(DELAYED_KEY, "-inf", now, 0, PROMOTE_BATCH)
            .await
            .map_err(QueueError::Redis)?;

        for payload in due {
            let removed: i64 = conn
                .zrem(DELAYED_KEY, &payload)
                .await
                .map_err(QueueError::Redis)?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
                    .await
                    .map_err(QueueError::Redis)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError> {
        self.push(&QueuedJob::new(job.clone())).await
    }

    async fn enqueue_delayed(&self, job: &PipelineJob, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload =
            serde_json::to_string(&QueuedJob::new(job.clone())).map_err(QueueError::Serialize)?;
        let due_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(DELAYED_KEY, &payload, due_at)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        self.promote_due().await?;

        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn
                .rpoplpush(PROCESSING_KEY, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<QueuedJob>,
    delayed: Vec<(Instant, QueuedJob)>,
    in_flight: Vec<QueuedJob>,
}

/// In-process queue with the same delivery semantics as [`RedisJobQueue`].
#[derive(Default)]
pub struct MemoryJobQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting in the ready list and the delay set, oldest first.
    pub fn pending(&self) -> Vec<PipelineJob> {
        let state = self.state.lock();
        state
            .ready
            .iter()
            .rev()
            .chain(state.delayed.iter().map(|(_, job)| job))
            .map(|q| q.job.clone())
            .collect()
    }

    /// Number of jobs currently parked in the delay set.
    pub fn delayed_count(&self) -> usize {
        self.state.lock().delayed.len()
    }

    /// Make every delayed job ready regardless of its due time.
    pub fn release_delayed(&self) {
        let mut state = self.state.lock();
        let delayed = std::mem::take(&mut state.delayed);
        for (_, job) in delayed {
            state.ready.push_front(job);
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<(), QueueError> {
        self.state.lock().ready.push_front(QueuedJob::new(job.clone()));
        Ok(())
    }

    async fn enqueue_delayed(&self, job: &PipelineJob, delay: Duration) -> Result<(), QueueError> {
        if delay.is_zero() {
            return self.enqueue(job).await;
        }
        self.state
            .lock()
            .delayed
            .push((Instant::now() + delay, QueuedJob::new(job.clone())));
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.delayed)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        state.delayed = waiting;
        for (_, job) in due {
            state.ready.push_front(job);
        }

        let job = state.ready.pop_back();
        if let Some(job) = &job {
            state.in_flight.push(job.clone());
        }
        Ok(job)
    }

    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.state
            .lock()
            .in_flight
            .retain(|q| q.delivery_id != job.delivery_id);
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<u64, QueueError> {
        let mut state = self.state.lock();
        let in_flight = std::mem::take(&mut state.in_flight);
        let count = in_flight.len() as u64;
        for job in in_flight {
            state.ready.push_back(job);
        }
        Ok(count)
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        Ok(self.state.lock().ready.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
