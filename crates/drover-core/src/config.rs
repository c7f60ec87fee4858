//! Configuration types for the coordinator and scheduler loop.

use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DroverConfig {
    /// Scheduler loop and liveness thresholds.
    pub scheduler: SchedulerConfig,
    /// Task defaults.
    pub tasks: TaskConfig,
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks.
    #[serde(with = "serde_duration_secs")]
    pub tick_interval: Duration,
    /// How long a node may hold a task without submitting a result.
    #[serde(with = "serde_duration_secs")]
    pub task_timeout: Duration,
    /// How long a node may stay silent before it is marked dead.
    #[serde(with = "serde_duration_secs")]
    pub node_timeout: Duration,
    /// Upper bound on tasks created per tick.
    pub max_tasks_per_cycle: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            task_timeout: Duration::from_secs(120),
            node_timeout: Duration::from_secs(30),
            max_tasks_per_cycle: 10,
        }
    }
}

/// Task defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Assignments allowed per task before it is failed.
    pub max_attempts: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
