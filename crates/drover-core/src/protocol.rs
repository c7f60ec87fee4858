//! Wire protocol - ワーカーノードとやり取りする JSON の形
//!
//! transport（HTTP など）は対象外。ここでは serde 型と、それを Coordinator
//! 呼び出しに変換する薄いハンドラだけを持つ。
//!
//! ```text
//! POST heartbeat  {"node": "phone-node-1", "status": "alive", "timestamp": 1700000000.123}
//!              -> {"status": "ok", "timestamp": "..."}
//! GET  task       -> {"task": {"task_id": 3, "type": "compute_congestion", "data": {...}, ...}}
//!                 -> {"task": null}
//! POST result     {"task_id": 3, "node_id": "phone-node-1", "status": "completed", "result": {...}}
//!              -> {"status": "ok", "timestamp": "..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::Coordinator;
use crate::domain::{NodeId, ReportedStatus, TaskId, TaskOutcome, TaskRecord, TaskType};
use crate::error::Result;

/// Detail stored when a node reports failure without saying why.
pub const MISSING_ERROR_DETAIL: &str = "no error detail provided";

/// Node-local clock reading sent with a heartbeat.
///
/// Workers send either epoch seconds or a (possibly naive) ISO string.
/// Informational only; liveness uses the coordinator's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeartbeatTimestamp {
    Epoch(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node: NodeId,
    #[serde(default)]
    pub status: ReportedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<HeartbeatTimestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    pub timestamp: DateTime<Utc>,
}

impl Ack {
    pub fn ok(timestamp: DateTime<Utc>) -> Self {
        Self {
            status: AckStatus::Ok,
            timestamp,
        }
    }
}

/// A task as handed to a worker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub data: serde_json::Value,
    pub assigned_at: DateTime<Utc>,
    /// 1-based assignment number.
    pub attempt: u32,
}

impl From<TaskRecord> for TaskAssignment {
    fn from(task: TaskRecord) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type,
            assigned_at: task.assigned_at().unwrap_or(task.updated_at),
            attempt: task.attempt_count + 1,
            data: task.payload,
        }
    }
}

/// Response to a task request. `task` is null when nothing is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task: Option<TaskAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub task_id: TaskId,
    pub node_id: NodeId,
    pub status: ResultStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Reported by the worker; logged, not stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
}

impl ResultSubmission {
    pub fn outcome(self) -> TaskOutcome {
        match self.status {
            ResultStatus::Completed => {
                TaskOutcome::Completed(self.result.unwrap_or(serde_json::Value::Null))
            }
            ResultStatus::Failed => TaskOutcome::Failed(
                self.error
                    .unwrap_or_else(|| MISSING_ERROR_DETAIL.to_string()),
            ),
        }
    }
}

pub async fn handle_heartbeat(coordinator: &Coordinator, request: HeartbeatRequest) -> Ack {
    coordinator.heartbeat(&request.node, request.status).await;
    Ack::ok(coordinator.now())
}

pub async fn handle_task_request(coordinator: &Coordinator, node: &NodeId) -> Result<TaskResponse> {
    let task = coordinator.request_task(node).await?;
    Ok(TaskResponse {
        task: task.map(TaskAssignment::from),
    })
}

pub async fn handle_result(coordinator: &Coordinator, submission: ResultSubmission) -> Result<Ack> {
    let task_id = submission.task_id;
    let node_id = submission.node_id.clone();
    if let Some(secs) = submission.processing_time_seconds {
        tracing::debug!(task_id = %task_id, node_id = %node_id, processing_time_seconds = secs, "result received");
    }

    coordinator
        .submit_result(task_id, &node_id, submission.outcome())
        .await?;
    Ok(Ack::ok(coordinator.now()))
}
