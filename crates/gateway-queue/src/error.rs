#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to serialize job payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("job exhausted its retry budget after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("unknown queue name: {0}")]
    UnknownQueue(String),
}
