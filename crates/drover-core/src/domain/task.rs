//! Task record: identity, payload and the lifecycle state machine.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{LeaseId, NodeId, TaskId};
use super::older_than;

/// Kind of analysis a task asks a worker to run.
///
/// The core never looks inside the payload; the tag only tells the worker
/// which computation the payload is meant for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    ComputeCongestion,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ComputeCongestion => "compute_congestion",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status.
///
/// State transitions:
/// - Pending -> Assigned -> InProgress -> Completed | Failed
/// - Assigned/InProgress -> TimedOut -> Pending (attempt_count + 1)
/// - Assigned/InProgress -> TimedOut -> Failed (attempts exhausted)
///
/// `TimedOut` only exists inside the store lock while an expired assignment
/// is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    TimedOut,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Is a node currently holding the task?
    pub fn is_assigned(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }
}

/// Why a task ended up Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The assigned node submitted a failed result.
    Reported { error: String },

    /// Every allowed assignment timed out or was orphaned by a dead node.
    AttemptsExhausted { attempts: u32, max_attempts: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Reported { error } => write!(f, "reported by worker: {error}"),
            FailureReason::AttemptsExhausted {
                attempts,
                max_attempts,
            } => write!(f, "attempts exhausted ({attempts}/{max_attempts})"),
        }
    }
}

/// What a node reports back for a task it holds.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Opaque result blob.
    Completed(serde_json::Value),

    /// Error detail from the worker.
    Failed(String),
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }
}

/// Result of expiring an assignment (timeout or dead node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Back in the pending queue.
    Requeued { attempt_count: u32 },

    /// No attempts left; the task is terminally Failed.
    AttemptsExhausted,
}

/// The node holding a task, since when, and under which lease.
///
/// Kept as one value so that node, lease and timestamp are always set or cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub node_id: NodeId,
    pub lease: LeaseId,
    pub assigned_at: DateTime<Utc>,
}

/// A task and its lifecycle metadata.
///
/// Design:
/// - The task store owns these; callers only ever see clones.
/// - The pending queue holds TaskIds only.
/// - All state transitions happen through the methods below.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub status: TaskStatus,

    /// Present iff status is Assigned or InProgress.
    pub assignment: Option<Assignment>,

    /// Node of the most recent assignment, kept after the task leaves it.
    pub last_node: Option<NodeId>,

    /// Set only on Completed.
    pub result: Option<serde_json::Value>,

    /// Set only on Failed.
    pub failure: Option<FailureReason>,

    /// Number of requeues so far.
    pub attempt_count: u32,

    /// Maximum number of assignments (always >= 1).
    pub max_attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        task_type: TaskType,
        payload: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type,
            payload,
            status: TaskStatus::Pending,
            assignment: None,
            last_node: None,
            result: None,
            failure: None,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn assigned_node(&self) -> Option<&NodeId> {
        self.assignment.as_ref().map(|a| &a.node_id)
    }

    pub fn assigned_at(&self) -> Option<DateTime<Utc>> {
        self.assignment.as_ref().map(|a| a.assigned_at)
    }

    pub fn lease(&self) -> Option<LeaseId> {
        self.assignment.as_ref().map(|a| a.lease)
    }

    /// Is `node_id` the node currently holding this task?
    pub fn is_held_by(&self, node_id: &NodeId) -> bool {
        self.status.is_assigned() && self.assigned_node() == Some(node_id)
    }

    /// Is `node_id` still holding this task under `lease`?
    pub fn is_held_under(&self, node_id: &NodeId, lease: LeaseId) -> bool {
        self.is_held_by(node_id) && self.lease() == Some(lease)
    }

    /// Has the current assignment been held for longer than `timeout`?
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match self.assigned_at() {
            Some(at) if self.status.is_assigned() => older_than(now, at, timeout),
            _ => false,
        }
    }

    /// Pending -> Assigned.
    pub fn assign(&mut self, node_id: NodeId, lease: LeaseId, now: DateTime<Utc>) {
        self.status = TaskStatus::Assigned;
        self.last_node = Some(node_id.clone());
        self.assignment = Some(Assignment {
            node_id,
            lease,
            assigned_at: now,
        });
        self.updated_at = now;
    }

    /// Assigned -> InProgress. The assignment timestamp is kept, so the
    /// timeout still counts from the original hand-out.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.updated_at = now;
    }

    /// Mark as completed with the worker's result.
    pub fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.assignment = None;
        self.result = Some(result);
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Mark as terminally failed.
    pub fn fail(&mut self, reason: FailureReason, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.assignment = None;
        self.failure = Some(reason);
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Undo a hand-out that never reached the node. No attempt is consumed.
    pub fn revert_assignment(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.assignment = None;
        self.updated_at = now;
    }

    /// Expire the current assignment.
    ///
    /// The task passes through TimedOut and is then either put back to
    /// Pending with one more attempt recorded, or failed when the expired
    /// assignment was its last allowed one.
    pub fn expire(&mut self, now: DateTime<Utc>) -> SweepOutcome {
        self.status = TaskStatus::TimedOut;
        self.assignment = None;

        let attempts = self.attempt_count + 1;
        if attempts >= self.max_attempts {
            self.fail(
                FailureReason::AttemptsExhausted {
                    attempts,
                    max_attempts: self.max_attempts,
                },
                now,
            );
            SweepOutcome::AttemptsExhausted
        } else {
            self.attempt_count = attempts;
            self.status = TaskStatus::Pending;
            self.updated_at = now;
            SweepOutcome::Requeued {
                attempt_count: attempts,
            }
        }
    }
}
