//! Status - 読み取り専用のスナップショット
//!
//! 2 つの store をそれぞれ 1 回ずつロックして読む。
//! store を跨いだ単一のアトミックな断面ではない（node 側と task 側で数 ms ずれうる）。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    FailureReason, NodeId, NodeInfo, NodeStatus, TaskId, TaskRecord, TaskStatus, TaskType,
};
use crate::store::{NodeCounts, TaskCounts, TaskStoreSnapshot};

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub status: NodeStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub current_task: Option<TaskId>,
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl From<NodeInfo> for NodeSummary {
    fn from(node: NodeInfo) -> Self {
        Self {
            id: node.id,
            status: node.status,
            last_heartbeat: node.last_heartbeat,
            current_task: node.current_task,
            tasks_assigned: node.tasks_assigned,
            tasks_completed: node.tasks_completed,
            tasks_failed: node.tasks_failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_node: Option<NodeId>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl From<TaskRecord> for TaskSummary {
    fn from(task: TaskRecord) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            status: task.status,
            created_at: task.created_at,
            assigned_at: task.assigned_at(),
            assigned_node: task.assignment.map(|a| a.node_id),
            attempt_count: task.attempt_count,
            max_attempts: task.max_attempts,
            finished_at: task.finished_at,
            failure: task.failure,
        }
    }
}

/// Point-in-time status of the coordinator.
///
/// Nodes and tasks are sorted by id.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub taken_at: DateTime<Utc>,
    pub pending_depth: usize,
    pub tasks: TaskCounts,
    pub nodes: NodeCounts,
    pub node_summaries: Vec<NodeSummary>,
    pub task_summaries: Vec<TaskSummary>,
}

impl StatusSnapshot {
    pub(crate) fn new(
        taken_at: DateTime<Utc>,
        nodes: Vec<NodeInfo>,
        node_counts: NodeCounts,
        tasks: TaskStoreSnapshot,
    ) -> Self {
        Self {
            taken_at,
            pending_depth: tasks.pending_depth,
            tasks: tasks.counts,
            nodes: node_counts,
            node_summaries: nodes.into_iter().map(NodeSummary::from).collect(),
            task_summaries: tasks.tasks.into_iter().map(TaskSummary::from).collect(),
        }
    }
}
