use serde::{Deserialize, Serialize};

/// A cron-style repeating schedule, checked once per tick by a ticker task
/// against Redis's stable key for the job id (`spec.md` §4.3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatableSchedule {
    /// Standard 5-field cron expression, e.g. `"* * * * *"` for the 60 s
    /// `plan-bundle` cron.
    pub cron: String,
    pub payload: serde_json::Value,
}

impl RepeatableSchedule {
    pub fn every_60_seconds(payload: serde_json::Value) -> Self {
        Self {
            cron: "* * * * *".to_string(),
            payload,
        }
    }
}
