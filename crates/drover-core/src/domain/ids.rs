//! Domain identifiers (strongly-typed IDs).
//!
//! - `TaskId`: TaskStore が作成順に払い出す連番。作成順 = FIFO 順なので `Ord` で比較できる。
//! - `NodeId`: ワーカーノード自身が名乗る文字列（例: `"phone-node-1"`）。
//! - `LeaseId`: 払い出し 1 回ごとの連番。同じタスクの古い払い出しと新しい払い出しを区別する。
//!
//! 両者は別の型なので、タスク ID とノード ID を取り違えることはコンパイル時に防がれる。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a Task, allocated monotonically by the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One hand-out of a task to a node, allocated monotonically by the task store.
///
/// A task handed out twice gets two different leases, so a late release
/// of the first hand-out cannot touch the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(u64);

impl LeaseId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease-{}", self.0)
    }
}

/// Identifier of a worker node, chosen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
