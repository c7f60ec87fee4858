//! In-memory task store.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{
    FailureReason, LeaseId, NodeId, SweepOutcome, TaskId, TaskOutcome, TaskRecord, TaskStatus,
    TaskType,
};
use crate::error::{DroverError, Result};

/// Task counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    /// Always 0 outside the store: an expired task is moved on to Pending or
    /// Failed under the same lock that marks it TimedOut.
    pub timed_out: usize,
}

impl TaskCounts {
    pub fn total(&self) -> usize {
        self.pending + self.assigned + self.in_progress + self.completed + self.failed + self.timed_out
    }
}

/// An assignment taken away from a node by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requeue {
    pub task_id: TaskId,
    pub node_id: NodeId,
    /// The hand-out that expired.
    pub lease: LeaseId,
    pub outcome: SweepOutcome,
}

/// Everything the status view needs, read under one lock acquisition.
#[derive(Debug, Clone)]
pub struct TaskStoreSnapshot {
    pub tasks: Vec<TaskRecord>,
    pub pending_depth: usize,
    pub counts: TaskCounts,
}

/// Task store state.
struct TaskStoreState {
    /// All task records (single source of truth for tasks).
    records: HashMap<TaskId, TaskRecord>,

    /// Pending queue (TaskIds only), oldest first.
    pending: VecDeque<TaskId>,

    /// Next task ID to assign.
    next_task_id: u64,

    /// Next lease to hand out.
    next_lease: u64,
}

impl TaskStoreState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            pending: VecDeque::new(),
            next_task_id: 1,
            next_lease: 1,
        }
    }

    /// Allocate a new TaskId.
    fn allocate_task_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    fn allocate_lease(&mut self) -> LeaseId {
        let lease = LeaseId::new(self.next_lease);
        self.next_lease += 1;
        lease
    }

    fn counts_by_status(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for record in self.records.values() {
            match record.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Assigned => counts.assigned += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::TimedOut => counts.timed_out += 1,
            }
        }
        counts
    }

    /// Record lookup that only succeeds for the node currently holding the task.
    fn held_by(&mut self, task_id: TaskId, node_id: &NodeId) -> Result<&mut TaskRecord> {
        let record = self
            .records
            .get_mut(&task_id)
            .ok_or(DroverError::TaskNotFound(task_id))?;
        if !record.is_held_by(node_id) {
            return Err(DroverError::StaleAssignment {
                task_id,
                node_id: node_id.clone(),
            });
        }
        Ok(record)
    }

    /// Expire one assignment; requeue at the tail or fail terminally.
    fn expire(&mut self, task_id: TaskId, now: DateTime<Utc>) -> Option<Requeue> {
        let record = self.records.get_mut(&task_id)?;
        let assignment = record.assignment.clone()?;
        let outcome = record.expire(now);
        let max_attempts = record.max_attempts;

        match outcome {
            SweepOutcome::Requeued { attempt_count } => {
                tracing::info!(
                    task_id = %task_id,
                    node_id = %assignment.node_id,
                    attempt_count,
                    "requeued task"
                );
                self.pending.push_back(task_id);
            }
            SweepOutcome::AttemptsExhausted => {
                tracing::warn!(
                    task_id = %task_id,
                    node_id = %assignment.node_id,
                    max_attempts,
                    "attempts exhausted, task failed"
                );
            }
        }

        Some(Requeue {
            task_id,
            node_id: assignment.node_id,
            lease: assignment.lease,
            outcome,
        })
    }
}

/// Owns every Task. Each operation is one check-and-transition under a single lock.
pub struct TaskStore {
    state: Mutex<TaskStoreState>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TaskStoreState::new()),
        }
    }

    /// Create a Pending task at the tail of the queue.
    pub async fn create_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> TaskRecord {
        let mut state = self.state.lock().await;
        let task_id = state.allocate_task_id();
        let record = TaskRecord::new(task_id, task_type, payload, max_attempts, now);

        state.records.insert(task_id, record.clone());
        state.pending.push_back(task_id);

        tracing::debug!(task_id = %task_id, task_type = %task_type, "created task");
        record
    }

    /// Hand the oldest Pending task to `node_id` under a fresh lease.
    /// `None` means the queue is empty.
    pub async fn dequeue_for(&self, node_id: &NodeId, now: DateTime<Utc>) -> Option<TaskRecord> {
        let mut state = self.state.lock().await;

        while let Some(task_id) = state.pending.pop_front() {
            let pending = state
                .records
                .get(&task_id)
                .is_some_and(|record| record.status == TaskStatus::Pending);
            if !pending {
                continue;
            }
            let lease = state.allocate_lease();
            let record = state.records.get_mut(&task_id)?;
            record.assign(node_id.clone(), lease, now);
            tracing::info!(task_id = %task_id, node_id = %node_id, lease = %lease, "assigned task");
            return Some(record.clone());
        }
        None
    }

    /// Apply a node's result. Only the node holding the task may do this.
    pub async fn record_result(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        outcome: TaskOutcome,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord> {
        let mut state = self.state.lock().await;
        let record = state.held_by(task_id, node_id)?;

        match outcome {
            TaskOutcome::Completed(result) => {
                record.complete(result, now);
                tracing::info!(task_id = %task_id, node_id = %node_id, "task completed");
            }
            TaskOutcome::Failed(error) => {
                tracing::warn!(task_id = %task_id, node_id = %node_id, error = %error, "task failed");
                record.fail(FailureReason::Reported { error }, now);
            }
        }
        Ok(record.clone())
    }

    /// Assigned -> InProgress for the holding node.
    pub async fn mark_in_progress(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord> {
        let mut state = self.state.lock().await;
        let record = state.held_by(task_id, node_id)?;
        if record.status == TaskStatus::Assigned {
            record.start(now);
            tracing::debug!(task_id = %task_id, node_id = %node_id, "task in progress");
        }
        Ok(record.clone())
    }

    /// Expire every assignment held longer than `timeout`.
    ///
    /// Running it again without the clock moving finds nothing to do.
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<Requeue> {
        let mut state = self.state.lock().await;

        let mut expired: Vec<TaskId> = state
            .records
            .values()
            .filter(|record| record.is_expired(now, timeout))
            .map(|record| record.id)
            .collect();
        // Requeue in creation order so the FIFO stays deterministic.
        expired.sort();

        expired
            .into_iter()
            .filter_map(|task_id| state.expire(task_id, now))
            .collect()
    }

    /// Requeue path for a task orphaned by a dead node.
    ///
    /// Same semantics as a timeout, applied only if `node_id` still holds the
    /// task under `lease`.
    pub async fn release(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        lease: LeaseId,
        now: DateTime<Utc>,
    ) -> Option<Requeue> {
        let mut state = self.state.lock().await;
        if !state.records.get(&task_id)?.is_held_under(node_id, lease) {
            return None;
        }
        state.expire(task_id, now)
    }

    /// Put a hand-out the node never received back at the head of the queue.
    pub async fn unassign(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        lease: LeaseId,
        now: DateTime<Utc>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(&task_id) else {
            return false;
        };
        if record.status != TaskStatus::Assigned || !record.is_held_under(node_id, lease) {
            return false;
        }
        record.revert_assignment(now);
        state.pending.push_front(task_id);
        true
    }

    pub async fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        let state = self.state.lock().await;
        state.records.get(&task_id).cloned()
    }

    pub async fn pending_depth(&self) -> usize {
        let state = self.state.lock().await;
        state.pending.len()
    }

    pub async fn counts_by_status(&self) -> TaskCounts {
        let state = self.state.lock().await;
        state.counts_by_status()
    }

    pub async fn snapshot(&self) -> TaskStoreSnapshot {
        let state = self.state.lock().await;
        let mut tasks: Vec<TaskRecord> = state.records.values().cloned().collect();
        tasks.sort_by_key(|record| record.id);
        TaskStoreSnapshot {
            tasks,
            pending_depth: state.pending.len(),
            counts: state.counts_by_status(),
        }
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
