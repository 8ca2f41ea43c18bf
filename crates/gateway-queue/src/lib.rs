//! The durable multi-queue abstraction of `spec.md` §4.3, §9.
//!
//! The contract is at-least-once delivery with a per-job retry policy:
//! `enqueue`, `enqueue_batch`, `consume(queue, handler, {concurrency,
//! retries, backoff})`, `repeatable(cron, id, data)`. This crate ships a
//! Redis-backed implementation — the "Redis-backed durable work-queue"
//! alternative `spec.md` §9 explicitly allows in place of a commercial queue
//! library (BullMQ in the original).

mod error;
mod names;
mod redis_queue;
mod repeatable;
mod worker;

pub use error::QueueError;
pub use names::QueueName;
pub use redis_queue::RedisQueue;
pub use repeatable::RepeatableSchedule;
pub use worker::{BackoffPolicy, ConsumeOptions, JobEnvelope, JobHandler};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The queue client contract every worker and HTTP handler programs against.
/// Generalizes the teacher's pattern of a single process-wide client handle
/// (`spec.md` §5: "no global mutable state other than ... the process-wide
/// queue client handles").
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    async fn enqueue<T: Serialize + Send + Sync>(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: &T,
    ) -> Result<(), QueueError>;

    async fn enqueue_batch<T: Serialize + Send + Sync>(
        &self,
        queue: QueueName,
        jobs: &[(String, T)],
    ) -> Result<(), QueueError>;

    /// Schedules a repeating job with a stable id so re-registering the same
    /// schedule is a no-op (`spec.md` §4.3: "a repeating plan-bundle cron (60
    /// s) uses a stable job id to prevent duplicate schedules").
    async fn repeatable(
        &self,
        queue: QueueName,
        job_id: &str,
        schedule: RepeatableSchedule,
    ) -> Result<(), QueueError>;

    async fn consume<T, H>(
        &self,
        queue: QueueName,
        handler: H,
        options: ConsumeOptions,
    ) -> Result<(), QueueError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        H: JobHandler<T> + 'static;
}
