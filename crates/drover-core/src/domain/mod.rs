//! Domain model (IDs, task and node records, state machines).

pub mod ids;
pub mod node;
pub mod task;

pub use ids::{LeaseId, NodeId, TaskId};
pub use node::{NodeInfo, NodeStatus, ReportedStatus};
pub use task::{
    Assignment, FailureReason, SweepOutcome, TaskOutcome, TaskRecord, TaskStatus, TaskType,
};

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Is `since` more than `limit` before `now`?
///
/// A clock that went backwards yields a negative age, which is never "older".
pub(crate) fn older_than(now: DateTime<Utc>, since: DateTime<Utc>, limit: Duration) -> bool {
    match (now - since).to_std() {
        Ok(elapsed) => elapsed > limit,
        Err(_) => false,
    }
}
