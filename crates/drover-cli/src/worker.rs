use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use drover_core::Coordinator;
use drover_core::domain::{NodeId, ReportedStatus};
use drover_core::protocol::{
    self, HeartbeatRequest, HeartbeatTimestamp, ResultStatus, ResultSubmission, TaskAssignment,
};
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::config::DemoConfig;

/// Simulated worker fleet handle.
/// - `shutdown_tx` を drop すると全ノードが止まる
/// - `shutdown_and_join()` で全ノードの終了を待てる
pub struct WorkerFleet {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerFleet {
    /// Spawn `demo.workers` simulated nodes.
    pub fn spawn(coordinator: Arc<Coordinator>, demo: &DemoConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(demo.workers);
        for i in 0..demo.workers {
            let node = SimulatedNode {
                id: NodeId::new(format!("sim-node-{}", i + 1)),
                coordinator: Arc::clone(&coordinator),
                demo: demo.clone(),
            };
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move { node.run(rx).await }));
        }

        Self { shutdown_tx, joins }
    }

    /// Shutdown and wait for all nodes.
    pub async fn shutdown_and_join(self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
        for j in self.joins {
            let _ = j.await;
        }
    }
}

/// What the node decided to do with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Complete,
    Fail,
    GoSilent,
}

struct SimulatedNode {
    id: NodeId,
    coordinator: Arc<Coordinator>,
    demo: DemoConfig,
}

impl SimulatedNode {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(node_id = %self.id, "simulated node online");
        let mut next_heartbeat = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if Instant::now() >= next_heartbeat {
                self.heartbeat(ReportedStatus::Alive).await;
                next_heartbeat = Instant::now() + self.demo.heartbeat_interval();
            }

            match protocol::handle_task_request(&self.coordinator, &self.id)
                .await
                .map(|response| response.task)
            {
                Ok(Some(task)) => {
                    let silent = self.work_on(task, &mut shutdown_rx).await;
                    if silent {
                        // Come back as if rebooted.
                        next_heartbeat = Instant::now();
                    }
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(node_id = %self.id, error = %err, "task request rejected");
                    // Dead nodes must heartbeat before asking again.
                    next_heartbeat = Instant::now();
                }
            }

            let pause = self.demo.poll_interval().min(
                next_heartbeat.saturating_duration_since(Instant::now()),
            );
            if wait_or_shutdown(&mut shutdown_rx, pause).await {
                break;
            }
        }

        tracing::info!(node_id = %self.id, "simulated node offline");
    }

    async fn heartbeat(&self, status: ReportedStatus) {
        let request = HeartbeatRequest {
            node: self.id.clone(),
            status,
            timestamp: Some(HeartbeatTimestamp::Epoch(
                chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            )),
        };
        protocol::handle_heartbeat(&self.coordinator, request).await;
    }

    /// Returns true if the node went silent instead of reporting.
    async fn work_on(&self, task: TaskAssignment, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        tracing::info!(node_id = %self.id, task_id = %task.task_id, attempt = task.attempt, "working");
        self.heartbeat(ReportedStatus::Working).await;

        let (behaviour, work) = self.decide();
        let started = Instant::now();
        if wait_or_shutdown(shutdown_rx, work).await {
            return false;
        }

        let (status, result, error) = match behaviour {
            Behaviour::GoSilent => {
                tracing::warn!(node_id = %self.id, task_id = %task.task_id, "going silent");
                wait_or_shutdown(shutdown_rx, Duration::from_secs(self.demo.silent_secs)).await;
                return true;
            }
            Behaviour::Fail => (
                ResultStatus::Failed,
                None,
                Some("simulated worker failure".to_string()),
            ),
            Behaviour::Complete => (ResultStatus::Completed, Some(analyze(&task.data)), None),
        };

        let submission = ResultSubmission {
            task_id: task.task_id,
            node_id: self.id.clone(),
            status,
            result,
            error,
            processing_time_seconds: Some(started.elapsed().as_secs_f64()),
        };
        if let Err(err) = protocol::handle_result(&self.coordinator, submission).await {
            tracing::warn!(node_id = %self.id, task_id = %task.task_id, error = %err, "result not accepted");
        }
        false
    }

    /// Roll the dice without holding the thread-local rng across an await.
    fn decide(&self) -> (Behaviour, Duration) {
        let mut rng = rand::thread_rng();
        let behaviour = if rng.gen_bool(self.demo.silent_rate.clamp(0.0, 1.0)) {
            Behaviour::GoSilent
        } else if rng.gen_bool(self.demo.fail_rate.clamp(0.0, 1.0)) {
            Behaviour::Fail
        } else {
            Behaviour::Complete
        };
        let lo = self.demo.min_work_ms.min(self.demo.max_work_ms);
        let hi = self.demo.max_work_ms.max(lo);
        (behaviour, Duration::from_millis(rng.gen_range(lo..=hi)))
    }
}

/// Sleep for `dur`; true if shutdown was requested in the meantime.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, dur: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() {
                return true;
            }
        }
        _ = sleep(dur) => {}
    }
    *shutdown_rx.borrow()
}

/// Congestion summary of one data window.
///
/// Density above 30 movements/hour or occupancy above 70% is high,
/// above 15/hour or 40% is medium.
fn analyze(data: &Value) -> Value {
    let movements = data["traffic_movements"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let window_minutes = data["window_minutes"].as_f64().unwrap_or(60.0).max(1.0);

    let count_of = |kind: &str| {
        movements
            .iter()
            .filter(|m| m["movement_type"] == kind)
            .count()
    };
    let arrivals = count_of("arrival");
    let departures = count_of("departure");
    let total = arrivals + departures;
    let occupancy_secs: f64 = movements
        .iter()
        .filter_map(|m| m["occupancy_seconds"].as_f64())
        .sum();

    let density = total as f64 / (window_minutes / 60.0);
    let occupancy = (occupancy_secs / (window_minutes * 60.0)).min(1.0);

    let mut stamps: Vec<DateTime<chrono::Utc>> = movements
        .iter()
        .filter_map(|m| m["timestamp_utc"].as_str())
        .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&chrono::Utc))
        .collect();
    stamps.sort();
    let min_spacing_minutes = stamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64 / 60.0)
        .fold(None, |acc: Option<f64>, gap| Some(acc.map_or(gap, |a| a.min(gap))));

    let (level, mut score) = if density > 30.0 || occupancy > 0.7 {
        ("high", 9)
    } else if density > 15.0 || occupancy > 0.4 {
        ("medium", 5)
    } else {
        ("low", 2)
    };
    if min_spacing_minutes.is_some_and(|gap| gap > 0.0 && gap < 3.0) {
        score += 2;
    }

    json!({
        "total_movements": total,
        "arrivals": arrivals,
        "departures": departures,
        "traffic_density": density,
        "runway_occupancy": occupancy,
        "min_spacing_minutes": min_spacing_minutes,
        "congestion_level": level,
        "congestion_score": score.min(10),
    })
}
