//! Demo configuration (`drover.toml` + `DROVER_*` env).

use std::time::Duration;

use drover_core::DroverConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub drover: DroverConfig,
    pub demo: DemoConfig,
}

impl CliConfig {
    /// `path` merged with `DROVER_`-prefixed env vars (`DROVER_SCHEDULER__NODE_TIMEOUT=10`).
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DROVER_").split("__"))
            .extract()
    }
}

/// Simulated fleet and data source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of simulated worker nodes.
    pub workers: usize,
    /// Stop after this many seconds; 0 runs until ctrl-c.
    pub run_secs: u64,
    pub heartbeat_interval_ms: u64,
    pub poll_interval_ms: u64,
    /// Simulated computation time range.
    pub min_work_ms: u64,
    pub max_work_ms: u64,
    /// Chance a worker reports a failed result.
    pub fail_rate: f64,
    /// Chance a worker goes silent while holding a task.
    pub silent_rate: f64,
    /// How long a silent worker stays quiet.
    pub silent_secs: u64,
    pub status_interval_secs: u64,

    pub airport_code: String,
    pub runway: String,
    pub window_minutes: u32,
    /// Spacing of simulated movement slots inside a window.
    pub slot_minutes: u32,
    pub windows_per_tick: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            run_secs: 60,
            heartbeat_interval_ms: 2_000,
            poll_interval_ms: 1_000,
            min_work_ms: 200,
            max_work_ms: 1_500,
            fail_rate: 0.1,
            silent_rate: 0.1,
            silent_secs: 45,
            status_interval_secs: 10,
            airport_code: "VABB".to_string(),
            runway: "09/27".to_string(),
            window_minutes: 60,
            slot_minutes: 5,
            windows_per_tick: 2,
        }
    }
}

impl DemoConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }
}
