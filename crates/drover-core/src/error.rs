use thiserror::Error;

use crate::domain::{NodeId, TaskId};

/// Errors returned to the caller of a single operation.
///
/// None of these are fatal: the transport layer maps them to a rejection of
/// that one request and the scheduler loop keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DroverError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("node not found: {0} (send a heartbeat first)")]
    NodeNotFound(NodeId),

    /// The node no longer holds the task, or the task is already terminal.
    #[error("stale assignment: {task_id} is not held by node {node_id}")]
    StaleAssignment { task_id: TaskId, node_id: NodeId },

    #[error("node {0} is marked dead; it must heartbeat before receiving work")]
    NodeDead(NodeId),

    /// The node already holds another task.
    #[error("node {node_id} already holds {task_id}")]
    NodeBusy { node_id: NodeId, task_id: TaskId },
}

pub type Result<T> = std::result::Result<T, DroverError>;
