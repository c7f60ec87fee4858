//! In-memory node registry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{LeaseId, NodeId, NodeInfo, NodeStatus, ReportedStatus, TaskId};
use crate::error::{DroverError, Result};

/// Node counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub alive: usize,
    pub working: usize,
    pub idle: usize,
    pub dead: usize,
}

impl NodeCounts {
    pub fn total(&self) -> usize {
        self.alive + self.working + self.idle + self.dead
    }

    fn add(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::Alive => self.alive += 1,
            NodeStatus::Working => self.working += 1,
            NodeStatus::Idle => self.idle += 1,
            NodeStatus::Dead => self.dead += 1,
        }
    }
}

/// A node the dead-node sweep just marked Dead.
///
/// `orphaned` is the hand-out it still held. The registry keeps pointing at
/// it until the caller releases that exact lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadNode {
    pub node_id: NodeId,
    pub orphaned: Option<(TaskId, LeaseId)>,
}

/// Owns every NodeInfo. Nodes are never removed, only marked Dead.
pub struct NodeRegistry {
    nodes: Mutex<HashMap<NodeId, NodeInfo>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Register on first contact, refresh liveness afterwards.
    ///
    /// The reported status is informational; the registry derives the stored
    /// status from whether the node holds a task.
    pub async fn heartbeat(
        &self,
        node_id: &NodeId,
        reported: ReportedStatus,
        now: DateTime<Utc>,
    ) -> NodeInfo {
        let mut nodes = self.nodes.lock().await;
        let node = nodes.entry(node_id.clone()).or_insert_with(|| {
            tracing::info!(node_id = %node_id, "registered node");
            NodeInfo::new(node_id.clone(), now)
        });

        if node.heartbeat(now) {
            tracing::info!(node_id = %node_id, "dead node is back");
        }
        tracing::debug!(node_id = %node_id, reported = ?reported, status = ?node.status, "heartbeat");
        node.clone()
    }

    /// Mark every node silent for longer than `timeout` as Dead.
    ///
    /// Already-dead nodes are skipped, so a second run at the same instant finds nothing.
    pub async fn sweep_dead(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<DeadNode> {
        let mut nodes = self.nodes.lock().await;
        let mut dead: Vec<DeadNode> = nodes
            .values_mut()
            .filter(|node| !node.is_dead() && node.is_silent(now, timeout))
            .map(|node| {
                let orphaned = node.mark_dead();
                tracing::warn!(
                    node_id = %node.id,
                    last_heartbeat = %node.last_heartbeat,
                    orphaned_task = ?orphaned.map(|(task_id, _)| task_id),
                    "node marked dead"
                );
                DeadNode {
                    node_id: node.id.clone(),
                    orphaned,
                }
            })
            .collect();
        dead.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        dead
    }

    /// Can this node take work? Returns the hand-out it already holds, if any.
    pub async fn check_available(&self, node_id: &NodeId) -> Result<Option<(TaskId, LeaseId)>> {
        let nodes = self.nodes.lock().await;
        let node = nodes
            .get(node_id)
            .ok_or_else(|| DroverError::NodeNotFound(node_id.clone()))?;
        if node.is_dead() {
            return Err(DroverError::NodeDead(node_id.clone()));
        }
        Ok(node.current_task.zip(node.current_lease))
    }

    /// Point the node at `task_id` under `lease`.
    ///
    /// Re-checks availability under this lock; the node may have died or
    /// picked up another task since `check_available`. A newer lease of the
    /// task it already points at replaces the old one.
    pub async fn assign(&self, node_id: &NodeId, task_id: TaskId, lease: LeaseId) -> Result<()> {
        let mut nodes = self.nodes.lock().await;
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| DroverError::NodeNotFound(node_id.clone()))?;
        if node.is_dead() {
            return Err(DroverError::NodeDead(node_id.clone()));
        }
        if let Some(held) = node.current_task {
            if held != task_id {
                return Err(DroverError::NodeBusy {
                    node_id: node_id.clone(),
                    task_id: held,
                });
            }
            node.renew(lease);
            return Ok(());
        }
        node.assign(task_id, lease);
        Ok(())
    }

    /// Count an accepted result against the node.
    pub async fn record_outcome(&self, node_id: &NodeId, task_id: TaskId, completed: bool) {
        let mut nodes = self.nodes.lock().await;
        if let Some(node) = nodes.get_mut(node_id) {
            node.record_outcome(task_id, completed);
        }
    }

    /// Drop the node's index entry if it still points at this exact hand-out.
    pub async fn release(&self, node_id: &NodeId, task_id: TaskId, lease: LeaseId) -> bool {
        let mut nodes = self.nodes.lock().await;
        nodes
            .get_mut(node_id)
            .is_some_and(|node| node.release(task_id, lease))
    }

    pub async fn get(&self, node_id: &NodeId) -> Option<NodeInfo> {
        let nodes = self.nodes.lock().await;
        nodes.get(node_id).cloned()
    }

    pub async fn counts_by_status(&self) -> NodeCounts {
        let nodes = self.nodes.lock().await;
        let mut counts = NodeCounts::default();
        for node in nodes.values() {
            counts.add(node.status);
        }
        counts
    }

    /// All nodes sorted by id, plus their counts, from one lock acquisition.
    pub async fn snapshot(&self) -> (Vec<NodeInfo>, NodeCounts) {
        let nodes = self.nodes.lock().await;
        let mut counts = NodeCounts::default();
        let mut list: Vec<NodeInfo> = nodes
            .values()
            .inspect(|node| counts.add(node.status))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        (list, counts)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
