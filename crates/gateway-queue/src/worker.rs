use async_trait::async_trait;
use std::time::Duration;

/// Exponential backoff schedule for job retries (`spec.md` §4.3: "5 s, 25 s,
/// 125 s" for the default `attempts=3`).
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const DEFAULT: BackoffPolicy = BackoffPolicy {
        base: Duration::from_secs(5),
        factor: 5,
        max_attempts: 3,
    };

    /// Delay before the `attempt`'th retry (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base * self.factor.pow(attempt.saturating_sub(1))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub concurrency: usize,
    pub backoff: BackoffPolicy,
    /// How long completed/failed jobs are retained, for observability
    /// (`spec.md` §4.3: "Completed jobs retained 7 days; failed jobs
    /// retained 14 days"). Not enforced by this trait; the Redis
    /// implementation sweeps on these windows.
    pub completed_retention: Duration,
    pub failed_retention: Duration,
}

impl ConsumeOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            backoff: BackoffPolicy::default(),
            completed_retention: Duration::from_secs(7 * 24 * 3600),
            failed_retention: Duration::from_secs(14 * 24 * 3600),
        }
    }
}

/// A dequeued job, carrying the queue's at-least-once delivery metadata.
#[derive(Debug, Clone)]
pub struct JobEnvelope<T> {
    pub job_id: String,
    pub attempt: u32,
    pub payload: T,
}

/// Implemented by worker stages (`plan-bundle`, `prepare-bundle`, ...). The
/// handler must be idempotent under redelivery: at-least-once delivery is
/// the queue's contract (`spec.md` §5).
#[async_trait]
pub trait JobHandler<T>: Send + Sync {
    type Error: std::fmt::Display + Send + Sync + 'static;

    async fn handle(&self, job: JobEnvelope<T>) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_matches_spec_defaults() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(25));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(125));
    }
}
