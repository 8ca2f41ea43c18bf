//! Redis-backed implementation of [`crate::QueueClient`].
//!
//! Layout per queue `q`:
//! - `q:pending` — a Redis list of job ids awaiting a worker (`LPUSH`/`BRPOP`,
//!   i.e. "queue consumers use BlockingPop-style long polling", `spec.md` §5).
//! - `q:payload:<job_id>` — the job's JSON payload.
//! - `q:attempts:<job_id>` — attempt counter.
//! - `q:delayed` — a sorted set of job ids scored by next-attempt unix time,
//!   for exponential-backoff retries.
//! - `q:dead` — a list of job ids that exhausted their retry budget.
//! - `q:repeatable` — a hash of repeatable job id -> schedule JSON, guarding
//!   against duplicate cron registration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::names::QueueName;
use crate::repeatable::RepeatableSchedule;
use crate::worker::{ConsumeOptions, JobEnvelope, JobHandler};
use crate::QueueClient;

#[derive(Clone)]
pub struct RedisQueue {
    manager: ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    fn pending_key(queue: QueueName) -> String {
        format!("{queue}:pending")
    }

    fn payload_key(queue: QueueName, job_id: &str) -> String {
        format!("{queue}:payload:{job_id}")
    }

    fn attempts_key(queue: QueueName, job_id: &str) -> String {
        format!("{queue}:attempts:{job_id}")
    }

    fn delayed_key(queue: QueueName) -> String {
        format!("{queue}:delayed")
    }

    fn dead_key(queue: QueueName) -> String {
        format!("{queue}:dead")
    }

    fn repeatable_key(queue: QueueName) -> String {
        format!("{queue}:repeatable")
    }

    async fn push_job<T: Serialize>(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: &T,
    ) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(payload)?;
        conn.set(Self::payload_key(queue, job_id), json).await?;
        conn.rpush(Self::pending_key(queue), job_id).await?;
        Ok(())
    }

    /// Moves any delayed jobs whose retry time has elapsed back onto the
    /// pending list. Run from a background task alongside `consume`.
    async fn promote_due_delayed(&self, queue: QueueName) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let now = chrono_now_unix();
        let due: Vec<String> = conn
            .zrangebyscore(Self::delayed_key(queue), 0, now)
            .await?;
        for job_id in due {
            let _: i64 = conn.zrem(Self::delayed_key(queue), &job_id).await?;
            conn.rpush(Self::pending_key(queue), &job_id).await?;
        }
        Ok(())
    }
}

fn chrono_now_unix() -> i64 {
    // Workers need wall-clock time for backoff scheduling; this is the one
    // place this crate reaches past `chrono::Utc::now()` abstraction since
    // the queue itself is the source of truth for "now" at dequeue time.
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn enqueue<T: Serialize + Send + Sync>(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: &T,
    ) -> Result<(), QueueError> {
        self.push_job(queue, job_id, payload).await
    }

    async fn enqueue_batch<T: Serialize + Send + Sync>(
        &self,
        queue: QueueName,
        jobs: &[(String, T)],
    ) -> Result<(), QueueError> {
        for (job_id, payload) in jobs {
            self.push_job(queue, job_id, payload).await?;
        }
        Ok(())
    }

    async fn repeatable(
        &self,
        queue: QueueName,
        job_id: &str,
        schedule: RepeatableSchedule,
    ) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let json = serde_json::to_string(&schedule)?;
        // HSETNX: a repeated registration with the same job id is a no-op,
        // matching "a stable job id to prevent duplicate schedules".
        let _: bool = conn
            .hset_nx(Self::repeatable_key(queue), job_id, json)
            .await?;
        Ok(())
    }

    async fn consume<T, H>(
        &self,
        queue: QueueName,
        handler: H,
        options: ConsumeOptions,
    ) -> Result<(), QueueError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        H: JobHandler<T> + 'static,
    {
        let handler = Arc::new(handler);
        let stop = Arc::new(Notify::new());

        {
            let this = self.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                loop {
                    if let Err(err) = this.promote_due_delayed(queue).await {
                        warn!(%queue, error = %err, "failed to promote delayed jobs");
                    }
                    tokio::select! {
                        _ = sleep(Duration::from_secs(1)) => {}
                        _ = stop.notified() => break,
                    }
                }
            });
        }

        for worker_index in 0..options.concurrency {
            let this = self.clone();
            let handler = handler.clone();
            let backoff = options.backoff.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                info!(%queue, worker_index, "worker started");
                loop {
                    tokio::select! {
                        result = this.pop_and_handle::<T, H>(queue, handler.as_ref(), &backoff) => {
                            if let Err(err) = result {
                                error!(%queue, error = %err, "job handling loop error");
                                sleep(Duration::from_secs(1)).await;
                            }
                        }
                        _ = stop.notified() => break,
                    }
                }
            });
        }

        Ok(())
    }
}

impl RedisQueue {
    async fn pop_and_handle<T, H>(
        &self,
        queue: QueueName,
        handler: &H,
        backoff: &crate::worker::BackoffPolicy,
    ) -> Result<(), QueueError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        H: JobHandler<T>,
    {
        let mut conn = self.manager.clone();
        // BRPOP with a long timeout: "queue consumers use BlockingPop-style
        // long polling" (`spec.md` §5).
        let popped: Option<(String, String)> =
            conn.brpop(Self::pending_key(queue), 5.0).await?;
        let Some((_key, job_id)) = popped else {
            return Ok(());
        };

        let payload_raw: Option<String> =
            conn.get(Self::payload_key(queue, &job_id)).await?;
        let Some(payload_raw) = payload_raw else {
            warn!(%queue, job_id, "payload missing for popped job, dropping");
            return Ok(());
        };
        let payload: T = match serde_json::from_str(&payload_raw) {
            Ok(p) => p,
            Err(err) => {
                error!(%queue, job_id, error = %err, "failed to deserialize job payload");
                return Ok(());
            }
        };

        let attempt: u32 = conn.incr(Self::attempts_key(queue, &job_id), 1).await?;
        let envelope = JobEnvelope {
            job_id: job_id.clone(),
            attempt,
            payload,
        };

        match handler.handle(envelope).await {
            Ok(()) => {
                conn.del(Self::attempts_key(queue, &job_id)).await?;
                conn.del(Self::payload_key(queue, &job_id)).await?;
            }
            Err(err) => {
                if attempt >= backoff.max_attempts {
                    error!(%queue, job_id, attempts = attempt, error = %err, "job exhausted retries, dead-lettering");
                    conn.rpush(Self::dead_key(queue), &job_id).await?;
                    conn.del(Self::attempts_key(queue, &job_id)).await?;
                } else {
                    let delay = backoff.delay_for_attempt(attempt);
                    let next_attempt_at = chrono_now_unix() + delay.as_secs() as i64;
                    warn!(%queue, job_id, attempts = attempt, error = %err, delay_secs = delay.as_secs(), "job failed, scheduling retry");
                    conn.zadd(Self::delayed_key(queue), &job_id, next_attempt_at)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

