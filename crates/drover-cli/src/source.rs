//! Simulated runway-movement data windows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use drover_core::ports::{Clock, SourceError, TaskSource};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::config::DemoConfig;

/// Chance that a slot contains a movement.
const MOVEMENT_CHANCE: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Arrival,
    Departure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub timestamp_utc: DateTime<Utc>,
    pub movement_type: MovementType,
    pub runway: String,
    pub occupancy_seconds: u32,
}

/// Payload of a `compute_congestion` task.
#[derive(Debug, Clone, Serialize)]
pub struct CongestionWindow {
    pub traffic_movements: Vec<Movement>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub airport_code: String,
    pub runway: String,
    pub window_minutes: u32,
}

/// Hands out the trailing windows of random arrivals and departures.
///
/// A batch holds the most recent window ending at `now`, then the ones
/// before it, newest first. Windows from successive ticks overlap.
pub struct SimulatedRunwaySource {
    clock: Arc<dyn Clock>,
    airport_code: String,
    runway: String,
    window_minutes: u32,
    slot_minutes: u32,
    windows_per_tick: usize,
}

impl SimulatedRunwaySource {
    pub fn new(clock: Arc<dyn Clock>, demo: &DemoConfig) -> Self {
        Self {
            clock,
            airport_code: demo.airport_code.clone(),
            runway: demo.runway.clone(),
            window_minutes: demo.window_minutes.max(1),
            slot_minutes: demo.slot_minutes.max(1),
            windows_per_tick: demo.windows_per_tick,
        }
    }

    fn window_len(&self) -> Duration {
        Duration::minutes(i64::from(self.window_minutes))
    }

    fn build_window(&self, start: DateTime<Utc>) -> CongestionWindow {
        let end = start + self.window_len();
        CongestionWindow {
            traffic_movements: simulate_movements(start, end, self.slot_minutes, &self.runway),
            window_start: start,
            window_end: end,
            airport_code: self.airport_code.clone(),
            runway: self.runway.clone(),
            window_minutes: self.window_minutes,
        }
    }
}

#[async_trait]
impl TaskSource for SimulatedRunwaySource {
    async fn next_batch(&self, limit: usize) -> Result<Option<Vec<Value>>, SourceError> {
        let mut end = self.clock.now();

        let mut batch = Vec::new();
        for _ in 0..limit.min(self.windows_per_tick) {
            let window = self.build_window(end - self.window_len());
            end = window.window_start;
            if window.traffic_movements.is_empty() {
                continue;
            }
            let payload =
                serde_json::to_value(&window).map_err(|e| SourceError::Other(e.to_string()))?;
            batch.push(payload);
        }

        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }
}

/// One slot every `slot_minutes` in `[start, end)`, each filled with
/// probability [`MOVEMENT_CHANCE`].
fn simulate_movements(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    slot_minutes: u32,
    runway: &str,
) -> Vec<Movement> {
    let mut rng = rand::thread_rng();
    let step = Duration::minutes(i64::from(slot_minutes));
    let mut movements = Vec::new();
    let mut at = start;
    while at < end {
        if rng.gen_bool(MOVEMENT_CHANCE) {
            movements.push(Movement {
                timestamp_utc: at,
                movement_type: if rng.gen_bool(0.5) {
                    MovementType::Arrival
                } else {
                    MovementType::Departure
                },
                runway: runway.to_string(),
                occupancy_seconds: rng.gen_range(40..=120),
            });
        }
        at += step;
    }
    movements
}
