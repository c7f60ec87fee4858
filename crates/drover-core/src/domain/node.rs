//! Worker node record and liveness state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{LeaseId, NodeId, TaskId};
use super::older_than;

/// Node status as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Heartbeating, holds no task.
    Alive,

    /// Holds a task.
    Working,

    /// Just reported a result; no heartbeat since.
    Idle,

    /// Silent past the dead-node threshold. Revived by the next heartbeat.
    Dead,
}

/// Status a node claims for itself in a heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    #[default]
    Alive,
    Working,
    Idle,
}

/// A worker node as seen by the registry.
///
/// `current_task` is an index entry (node -> task id), never ownership.
/// `current_lease` names the hand-out behind it; the two are set and cleared together.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub status: NodeStatus,
    pub first_seen: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_task: Option<TaskId>,
    pub current_lease: Option<LeaseId>,

    /// Monotonic counters.
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl NodeInfo {
    pub fn new(id: NodeId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: NodeStatus::Alive,
            first_seen: now,
            last_heartbeat: now,
            current_task: None,
            current_lease: None,
            tasks_assigned: 0,
            tasks_completed: 0,
            tasks_failed: 0,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status == NodeStatus::Dead
    }

    /// Record a heartbeat. Returns true if the node was Dead before.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) -> bool {
        let revived = self.is_dead();
        self.last_heartbeat = now;
        self.status = if self.current_task.is_some() {
            NodeStatus::Working
        } else {
            NodeStatus::Alive
        };
        revived
    }

    /// Has the node been silent for longer than `timeout`?
    pub fn is_silent(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        older_than(now, self.last_heartbeat, timeout)
    }

    pub fn assign(&mut self, task_id: TaskId, lease: LeaseId) {
        self.current_task = Some(task_id);
        self.current_lease = Some(lease);
        self.tasks_assigned += 1;
        self.status = NodeStatus::Working;
    }

    /// Count a reported result and drop the index entry if it still points at `task_id`.
    pub fn record_outcome(&mut self, task_id: TaskId, completed: bool) {
        if completed {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        if self.current_task == Some(task_id) {
            self.clear_task();
            if !self.is_dead() {
                self.status = NodeStatus::Idle;
            }
        }
    }

    /// Move the index entry to a newer lease of the same task.
    pub fn renew(&mut self, lease: LeaseId) {
        if self.current_lease.is_some_and(|held| held < lease) {
            self.current_lease = Some(lease);
        }
    }

    /// Clear the index entry if it refers to this exact hand-out. Returns true if cleared.
    pub fn release(&mut self, task_id: TaskId, lease: LeaseId) -> bool {
        if self.current_task != Some(task_id) || self.current_lease != Some(lease) {
            return false;
        }
        self.clear_task();
        true
    }

    /// Mark as dead and report the hand-out it held (if any).
    ///
    /// The index entry stays until the task store has taken the task back,
    /// so the node cannot be handed a second task in between.
    pub fn mark_dead(&mut self) -> Option<(TaskId, LeaseId)> {
        self.status = NodeStatus::Dead;
        self.current_task.zip(self.current_lease)
    }

    fn clear_task(&mut self) {
        self.current_task = None;
        self.current_lease = None;
        if self.status == NodeStatus::Working {
            self.status = NodeStatus::Alive;
        }
    }
}
