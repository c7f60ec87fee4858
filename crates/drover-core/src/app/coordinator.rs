//! Coordinator - transport 層が呼ぶファサード
//!
//! TaskStore と NodeRegistry を束ね、store を跨ぐ処理を順番に実行する。
//!
//! # 設計原則
//! - 2 つの store のロックを同時に保持しない
//! - 跨ぐ処理は「片方の critical section → もう片方の critical section」の 2 段
//! - 後段は lease（払い出し番号）で照合し、2 段の間に起きた新しい払い出しには触れない
//! - dead-node sweep ではノード側の参照を task store の回収が済むまで残す

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::status::StatusSnapshot;
use crate::config::DroverConfig;
use crate::domain::{
    NodeId, NodeInfo, ReportedStatus, SweepOutcome, TaskId, TaskOutcome, TaskRecord, TaskType,
};
use crate::error::{DroverError, Result};
use crate::ports::Clock;
use crate::store::{DeadNode, NodeRegistry, Requeue, TaskStore};

/// Result of one dead-node sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadSweep {
    pub dead_nodes: Vec<DeadNode>,
    /// Tasks taken back from the dead nodes.
    pub released: Vec<Requeue>,
}

pub struct Coordinator {
    tasks: TaskStore,
    nodes: NodeRegistry,
    clock: Arc<dyn Clock>,
    config: DroverConfig,
}

impl Coordinator {
    pub fn new(config: DroverConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: TaskStore::new(),
            nodes: NodeRegistry::new(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DroverConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a heartbeat.
    ///
    /// A node reporting `working` while it holds a task moves that task to InProgress.
    pub async fn heartbeat(&self, node_id: &NodeId, reported: ReportedStatus) -> NodeInfo {
        let now = self.clock.now();
        let info = self.nodes.heartbeat(node_id, reported, now).await;

        if reported == ReportedStatus::Working {
            if let Some(task_id) = info.current_task {
                if let Err(err) = self.tasks.mark_in_progress(task_id, node_id, now).await {
                    tracing::debug!(node_id = %node_id, error = %err, "working heartbeat ignored");
                }
            }
        }
        info
    }

    /// Hand the node a task. `Ok(None)` means the queue is empty.
    ///
    /// A node that already holds an active task gets that same task back.
    pub async fn request_task(&self, node_id: &NodeId) -> Result<Option<TaskRecord>> {
        if let Some((held, lease)) = self.nodes.check_available(node_id).await? {
            match self.tasks.get(held).await {
                Some(task) if task.is_held_by(node_id) => return Ok(Some(task)),
                // Index points at a task the node lost to a sweep.
                _ => {
                    self.nodes.release(node_id, held, lease).await;
                }
            }
        }

        let now = self.clock.now();
        let Some((task, lease)) = self
            .tasks
            .dequeue_for(node_id, now)
            .await
            .and_then(|task| task.lease().map(|lease| (task, lease)))
        else {
            tracing::debug!(node_id = %node_id, "no task available");
            return Ok(None);
        };

        match self.nodes.assign(node_id, task.id, lease).await {
            Ok(()) => Ok(Some(task)),
            Err(DroverError::NodeBusy { task_id: held, .. }) => {
                // A concurrent request from the same node won.
                self.tasks.unassign(task.id, node_id, lease, now).await;
                Ok(self
                    .tasks
                    .get(held)
                    .await
                    .filter(|task| task.is_held_by(node_id)))
            }
            Err(err) => {
                self.tasks.unassign(task.id, node_id, lease, now).await;
                tracing::info!(task_id = %task.id, node_id = %node_id, error = %err, "assignment reverted");
                Err(err)
            }
        }
    }

    /// Accept a result from the node holding the task.
    ///
    /// A late or duplicate result is rejected with `StaleAssignment` and changes nothing.
    pub async fn submit_result(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        outcome: TaskOutcome,
    ) -> Result<TaskRecord> {
        let now = self.clock.now();
        let completed = outcome.is_completed();

        let task = match self.tasks.record_result(task_id, node_id, outcome, now).await {
            Ok(task) => task,
            Err(err) => {
                tracing::warn!(task_id = %task_id, node_id = %node_id, error = %err, "result rejected");
                return Err(err);
            }
        };

        self.nodes.record_outcome(node_id, task_id, completed).await;
        Ok(task)
    }

    /// Create a task with the configured attempt limit.
    pub async fn create_task(&self, payload: serde_json::Value) -> TaskRecord {
        self.create_task_with(TaskType::default(), payload, self.config.tasks.max_attempts)
            .await
    }

    pub async fn create_task_with(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> TaskRecord {
        let now = self.clock.now();
        self.tasks
            .create_task(task_type, payload, max_attempts, now)
            .await
    }

    /// Mark silent nodes Dead and take their tasks back.
    pub async fn sweep_dead(&self) -> DeadSweep {
        let now = self.clock.now();
        let dead_nodes = self
            .nodes
            .sweep_dead(now, self.config.scheduler.node_timeout)
            .await;
        let released = self.release_orphans(&dead_nodes, now).await;

        DeadSweep {
            dead_nodes,
            released,
        }
    }

    /// Second half of the dead-node sweep: requeue each orphaned hand-out,
    /// then drop the node's index entry for that lease.
    async fn release_orphans(&self, dead_nodes: &[DeadNode], now: DateTime<Utc>) -> Vec<Requeue> {
        let mut released = Vec::new();
        for dead in dead_nodes {
            let Some((task_id, lease)) = dead.orphaned else {
                continue;
            };
            if let Some(requeue) = self.tasks.release(task_id, &dead.node_id, lease, now).await {
                released.push(requeue);
            }
            self.nodes.release(&dead.node_id, task_id, lease).await;
        }
        released
    }

    /// Expire assignments held past the task timeout and clear the node index.
    pub async fn sweep_timeouts(&self) -> Vec<Requeue> {
        let now = self.clock.now();
        let requeues = self
            .tasks
            .sweep_timeouts(now, self.config.scheduler.task_timeout)
            .await;
        self.clear_expired(&requeues).await;
        requeues
    }

    /// Second half of the timeout sweep. Only the expired lease is cleared,
    /// so a node that was handed the task again in between keeps it.
    async fn clear_expired(&self, requeues: &[Requeue]) {
        for requeue in requeues {
            self.nodes
                .release(&requeue.node_id, requeue.task_id, requeue.lease)
                .await;
        }
    }

    /// Point-in-time view of both stores (one lock acquisition each).
    pub async fn get_status(&self) -> StatusSnapshot {
        let taken_at = self.clock.now();
        let (nodes, node_counts) = self.nodes.snapshot().await;
        let tasks = self.tasks.snapshot().await;
        StatusSnapshot::new(taken_at, nodes, node_counts, tasks)
    }

    pub async fn task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tasks.get(task_id).await
    }

    pub async fn node(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.nodes.get(node_id).await
    }

    pub async fn pending_depth(&self) -> usize {
        self.tasks.pending_depth().await
    }
}

/// Split sweep results into (requeued, failed) counts.
pub fn count_outcomes<'a>(requeues: impl IntoIterator<Item = &'a Requeue>) -> (usize, usize) {
    requeues
        .into_iter()
        .fold((0, 0), |(requeued, failed), r| match r.outcome {
            SweepOutcome::Requeued { .. } => (requeued + 1, failed),
            SweepOutcome::AttemptsExhausted => (requeued, failed + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureReason, NodeStatus, TaskStatus};
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn n(id: &str) -> NodeId {
        NodeId::new(id)
    }

    fn setup(task_timeout: u64, node_timeout: u64) -> (Coordinator, Arc<FixedClock>) {
        let mut config = DroverConfig::default();
        config.scheduler.task_timeout = Duration::from_secs(task_timeout);
        config.scheduler.node_timeout = Duration::from_secs(node_timeout);
        let clock = Arc::new(FixedClock::new(t0()));
        (Coordinator::new(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn request_task_requires_heartbeat_first() {
        let (coord, _) = setup(60, 30);
        coord.create_task(json!({})).await;

        let err = coord.request_task(&n("stranger")).await.unwrap_err();

        assert_eq!(err, DroverError::NodeNotFound(n("stranger")));
        assert_eq!(coord.pending_depth().await, 1);
    }

    #[tokio::test]
    async fn full_round_trip_updates_both_sides() {
        let (coord, clock) = setup(60, 30);
        let created = coord.create_task(json!({"airport_code": "GCLP"})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;

        let task = coord.request_task(&n("a")).await.unwrap().unwrap();
        assert_eq!(task.id, created.id);
        assert_eq!(task.payload, json!({"airport_code": "GCLP"}));
        assert_eq!(
            coord.node(&n("a")).await.unwrap().current_task,
            Some(task.id)
        );

        coord.heartbeat(&n("a"), ReportedStatus::Working).await;
        assert_eq!(
            coord.task(task.id).await.unwrap().status,
            TaskStatus::InProgress
        );

        clock.advance(Duration::from_secs(10));
        let done = coord
            .submit_result(task.id, &n("a"), TaskOutcome::Completed(json!({"level": "low"})))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let node = coord.node(&n("a")).await.unwrap();
        assert_eq!(node.status, NodeStatus::Idle);
        assert_eq!(node.current_task, None);
        assert_eq!(node.tasks_assigned, 1);
        assert_eq!(node.tasks_completed, 1);
    }

    #[tokio::test]
    async fn repeated_request_returns_held_task() {
        let (coord, _) = setup(60, 30);
        coord.create_task(json!(1)).await;
        coord.create_task(json!(2)).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;

        let first = coord.request_task(&n("a")).await.unwrap().unwrap();
        let again = coord.request_task(&n("a")).await.unwrap().unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(coord.pending_depth().await, 1);
        assert_eq!(coord.node(&n("a")).await.unwrap().tasks_assigned, 1);
    }

    #[tokio::test]
    async fn empty_queue_is_not_an_error() {
        let (coord, _) = setup(60, 30);
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        assert!(coord.request_task(&n("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reported_failure_counts_against_node() {
        let (coord, _) = setup(60, 30);
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        let task = coord.request_task(&n("a")).await.unwrap().unwrap();

        let failed = coord
            .submit_result(task.id, &n("a"), TaskOutcome::Failed("bad window".into()))
            .await
            .unwrap();

        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(
            failed.failure,
            Some(FailureReason::Reported {
                error: "bad window".into()
            })
        );
        assert_eq!(coord.node(&n("a")).await.unwrap().tasks_failed, 1);
    }

    #[tokio::test]
    async fn result_from_wrong_node_is_rejected() {
        let (coord, _) = setup(60, 30);
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.heartbeat(&n("b"), ReportedStatus::Alive).await;
        let task = coord.request_task(&n("a")).await.unwrap().unwrap();

        let err = coord
            .submit_result(task.id, &n("b"), TaskOutcome::Completed(json!("forged")))
            .await
            .unwrap_err();

        assert!(matches!(err, DroverError::StaleAssignment { .. }));
        let after = coord.task(task.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Assigned);
        assert_eq!(after.result, None);
        assert_eq!(after.attempt_count, 0);
        assert_eq!(coord.node(&n("b")).await.unwrap().tasks_completed, 0);
    }

    #[tokio::test]
    async fn timed_out_task_is_requeued_exactly_once() {
        let (coord, clock) = setup(60, 300);
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        let task = coord.request_task(&n("a")).await.unwrap().unwrap();

        clock.advance(Duration::from_secs(61));
        let first = coord.sweep_timeouts().await;
        let second = coord.sweep_timeouts().await;

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        let requeued = coord.task(task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert_eq!(requeued.attempt_count, 1);

        let node = coord.node(&n("a")).await.unwrap();
        assert_eq!(node.current_task, None);
        assert_eq!(node.tasks_failed, 0);
    }

    #[tokio::test]
    async fn late_result_after_timeout_is_stale() {
        let (coord, clock) = setup(60, 300);
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.heartbeat(&n("b"), ReportedStatus::Alive).await;
        let task = coord.request_task(&n("a")).await.unwrap().unwrap();

        clock.advance(Duration::from_secs(61));
        coord.sweep_timeouts().await;
        let reassigned = coord.request_task(&n("b")).await.unwrap().unwrap();
        assert_eq!(reassigned.id, task.id);

        let err = coord
            .submit_result(task.id, &n("a"), TaskOutcome::Completed(json!("late")))
            .await
            .unwrap_err();

        assert!(matches!(err, DroverError::StaleAssignment { .. }));
        let current = coord.task(task.id).await.unwrap();
        assert_eq!(current.assigned_node(), Some(&n("b")));
        assert_eq!(current.result, None);
    }

    #[tokio::test]
    async fn dead_node_cannot_take_work_until_it_heartbeats() {
        let (coord, clock) = setup(600, 30);
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;

        clock.advance(Duration::from_secs(31));
        coord.sweep_dead().await;

        assert_eq!(
            coord.request_task(&n("a")).await.unwrap_err(),
            DroverError::NodeDead(n("a"))
        );
        assert_eq!(coord.pending_depth().await, 1);

        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        assert!(coord.request_task(&n("a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweeps_do_not_count_as_node_failures() {
        let (coord, clock) = setup(600, 30);
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.request_task(&n("a")).await.unwrap();

        clock.advance(Duration::from_secs(31));
        let sweep = coord.sweep_dead().await;

        assert_eq!(count_outcomes(&sweep.released), (1, 0));
        assert_eq!(coord.node(&n("a")).await.unwrap().tasks_failed, 0);
    }

    #[tokio::test]
    async fn scenario_single_attempt_task_fails_after_timeout() {
        let (coord, clock) = setup(60, 3600);
        let t1 = coord
            .create_task_with(TaskType::ComputeCongestion, json!({"t": 1}), 1)
            .await;
        coord.heartbeat(&n("n1"), ReportedStatus::Alive).await;

        let got = coord.request_task(&n("n1")).await.unwrap().unwrap();
        assert_eq!(got.id, t1.id);
        assert_eq!(got.status, TaskStatus::Assigned);
        assert_eq!(got.assigned_node(), Some(&n("n1")));

        clock.advance(Duration::from_secs(61));
        let requeues = coord.sweep_timeouts().await;

        assert_eq!(count_outcomes(&requeues), (0, 1));
        let t1 = coord.task(t1.id).await.unwrap();
        assert_eq!(t1.status, TaskStatus::Failed);
        assert_eq!(coord.pending_depth().await, 0);
        assert_eq!(coord.node(&n("n1")).await.unwrap().current_task, None);
    }

    #[tokio::test]
    async fn scenario_silent_node_is_marked_dead_and_task_requeued() {
        let (coord, clock) = setup(3600, 30);
        let t2 = coord.create_task(json!({"t": 2})).await;
        coord.heartbeat(&n("n2"), ReportedStatus::Alive).await;
        coord.request_task(&n("n2")).await.unwrap().unwrap();
        coord.heartbeat(&n("n2"), ReportedStatus::Working).await;
        assert_eq!(
            coord.node(&n("n2")).await.unwrap().current_task,
            Some(t2.id)
        );

        clock.advance(Duration::from_secs(40));
        let sweep = coord.sweep_dead().await;

        assert_eq!(sweep.dead_nodes.len(), 1);
        let n2 = coord.node(&n("n2")).await.unwrap();
        assert_eq!(n2.status, NodeStatus::Dead);
        assert_eq!(n2.current_task, None);

        let t2 = coord.task(t2.id).await.unwrap();
        assert_eq!(t2.status, TaskStatus::Pending);
        assert_eq!(t2.attempt_count, 1);

        // Released exactly once.
        let again = coord.sweep_dead().await;
        assert!(again.dead_nodes.is_empty());
        assert!(again.released.is_empty());
        assert_eq!(coord.task(t2.id).await.unwrap().attempt_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_concurrent_requests_for_single_task() {
        let (coord, _) = setup(60, 30);
        let coord = Arc::new(coord);
        let t3 = coord.create_task(json!({"t": 3})).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.heartbeat(&n("b"), ReportedStatus::Alive).await;

        let ca = Arc::clone(&coord);
        let cb = Arc::clone(&coord);
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { ca.request_task(&n("a")).await }),
            tokio::spawn(async move { cb.request_task(&n("b")).await }),
        );
        let ra = ra.unwrap().unwrap();
        let rb = rb.unwrap().unwrap();

        let winners: Vec<&TaskRecord> = ra.iter().chain(rb.iter()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, t3.id);
        assert_eq!(winners[0].status, TaskStatus::Assigned);
        assert_eq!(coord.pending_depth().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_nodes_never_share_a_task() {
        let (coord, _) = setup(60, 30);
        let coord = Arc::new(coord);
        for i in 0..20 {
            coord.create_task(json!({ "seq": i })).await;
        }

        let mut joins = Vec::new();
        for i in 0..8 {
            let coord = Arc::clone(&coord);
            joins.push(tokio::spawn(async move {
                let node = NodeId::new(format!("node-{i}"));
                coord.heartbeat(&node, ReportedStatus::Alive).await;
                let mut done = Vec::new();
                while let Some(task) = coord.request_task(&node).await.unwrap() {
                    coord
                        .submit_result(task.id, &node, TaskOutcome::Completed(json!(i)))
                        .await
                        .unwrap();
                    done.push(task.id);
                }
                done
            }));
        }

        let mut all = Vec::new();
        for join in joins {
            all.extend(join.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20);

        let status = coord.get_status().await;
        assert_eq!(status.tasks.completed, 20);
        assert_eq!(status.pending_depth, 0);
    }

    /// Tasks the task store says `node` is holding right now.
    async fn held_by(coord: &Coordinator, node: &NodeId) -> Vec<TaskId> {
        coord
            .tasks
            .snapshot()
            .await
            .tasks
            .into_iter()
            .filter(|task| task.is_held_by(node))
            .map(|task| task.id)
            .collect()
    }

    #[tokio::test]
    async fn timeout_release_does_not_clear_a_newer_hand_out() {
        let (coord, clock) = setup(60, 300);
        let t1 = coord.create_task(json!(1)).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.request_task(&n("a")).await.unwrap().unwrap();
        clock.advance(Duration::from_secs(61));

        // Task side of the sweep only.
        let requeues = coord
            .tasks
            .sweep_timeouts(coord.now(), coord.config.scheduler.task_timeout)
            .await;
        assert_eq!(requeues.len(), 1);

        // The node asks again before its index entry is cleared.
        let again = coord.request_task(&n("a")).await.unwrap().unwrap();
        assert_eq!(again.id, t1.id);
        assert_eq!(again.attempt_count, 1);

        // Node side of the sweep, now late.
        coord.clear_expired(&requeues).await;

        let node = coord.node(&n("a")).await.unwrap();
        assert_eq!(node.current_task, Some(t1.id));
        assert_eq!(node.current_lease, again.lease());

        coord.create_task(json!(2)).await;
        let third = coord.request_task(&n("a")).await.unwrap().unwrap();
        assert_eq!(third.id, t1.id);
        assert_eq!(held_by(&coord, &n("a")).await, vec![t1.id]);
        assert_eq!(coord.pending_depth().await, 1);
    }

    #[tokio::test]
    async fn working_heartbeat_between_timeout_halves_does_not_resurrect_task() {
        let (coord, clock) = setup(60, 300);
        let t1 = coord.create_task(json!(1)).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.request_task(&n("a")).await.unwrap().unwrap();
        clock.advance(Duration::from_secs(61));

        let requeues = coord
            .tasks
            .sweep_timeouts(coord.now(), coord.config.scheduler.task_timeout)
            .await;
        coord.heartbeat(&n("a"), ReportedStatus::Working).await;
        coord.clear_expired(&requeues).await;

        assert_eq!(coord.task(t1.id).await.unwrap().status, TaskStatus::Pending);
        let node = coord.node(&n("a")).await.unwrap();
        assert_eq!(node.current_task, None);
        assert_eq!(node.status, NodeStatus::Alive);
        assert!(held_by(&coord, &n("a")).await.is_empty());
    }

    #[tokio::test]
    async fn revived_node_between_dead_sweep_halves_gets_no_second_task() {
        let (coord, clock) = setup(3600, 30);
        let t1 = coord.create_task(json!(1)).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.request_task(&n("a")).await.unwrap().unwrap();
        clock.advance(Duration::from_secs(31));

        // Registry side of the sweep only.
        let dead = coord
            .nodes
            .sweep_dead(coord.now(), coord.config.scheduler.node_timeout)
            .await;
        assert_eq!(dead.len(), 1);

        // The node comes back and asks for work while its task is still out.
        let t2 = coord.create_task(json!(2)).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        let got = coord.request_task(&n("a")).await.unwrap().unwrap();
        assert_eq!(got.id, t1.id);
        assert_eq!(held_by(&coord, &n("a")).await, vec![t1.id]);

        // Task side of the sweep.
        let released = coord.release_orphans(&dead, coord.now()).await;
        assert_eq!(count_outcomes(&released), (1, 0));
        assert!(held_by(&coord, &n("a")).await.is_empty());
        assert_eq!(coord.node(&n("a")).await.unwrap().current_task, None);

        let next = coord.request_task(&n("a")).await.unwrap().unwrap();
        assert_eq!(next.id, t2.id);
        assert_eq!(held_by(&coord, &n("a")).await, vec![t2.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweeps_racing_requests_never_double_assign_a_node() {
        let mut config = DroverConfig::default();
        config.scheduler.task_timeout = Duration::from_secs(3);
        config.scheduler.node_timeout = Duration::from_secs(5);
        let clock = Arc::new(FixedClock::new(t0()));
        let coord = Arc::new(Coordinator::new(config, clock.clone()));
        for i in 0..30 {
            coord.create_task_with(TaskType::ComputeCongestion, json!(i), 50).await;
        }

        let mut joins = Vec::new();
        for i in 0..4 {
            let coord = Arc::clone(&coord);
            joins.push(tokio::spawn(async move {
                let node = NodeId::new(format!("node-{i}"));
                for round in 0..200 {
                    if round % 4 == 0 {
                        coord.heartbeat(&node, ReportedStatus::Alive).await;
                    }
                    if let Ok(Some(task)) = coord.request_task(&node).await {
                        if round % 5 == 0 {
                            let _ = coord
                                .submit_result(task.id, &node, TaskOutcome::Completed(json!(round)))
                                .await;
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        {
            let coord = Arc::clone(&coord);
            let clock = clock.clone();
            joins.push(tokio::spawn(async move {
                for _ in 0..200 {
                    clock.advance(Duration::from_secs(1));
                    coord.sweep_timeouts().await;
                    coord.sweep_dead().await;
                    tokio::task::yield_now().await;
                }
            }));
        }
        for join in joins {
            join.await.unwrap();
        }

        for i in 0..4 {
            let node = NodeId::new(format!("node-{i}"));
            let held = held_by(&coord, &node).await;
            assert!(held.len() <= 1, "{node} holds {held:?}");
            if let Some(task_id) = held.first() {
                assert_eq!(coord.node(&node).await.unwrap().current_task, Some(*task_id));
            }
        }
    }

    #[tokio::test]
    async fn status_reflects_both_stores() {
        let (coord, _) = setup(60, 30);
        coord.create_task(json!({})).await;
        coord.create_task(json!({})).await;
        coord.heartbeat(&n("b"), ReportedStatus::Alive).await;
        coord.heartbeat(&n("a"), ReportedStatus::Alive).await;
        coord.request_task(&n("a")).await.unwrap();

        let status = coord.get_status().await;

        assert_eq!(status.taken_at, t0());
        assert_eq!(status.pending_depth, 1);
        assert_eq!(status.tasks.pending, 1);
        assert_eq!(status.tasks.assigned, 1);
        assert_eq!(status.nodes.working, 1);
        assert_eq!(status.nodes.alive, 1);
        assert_eq!(status.node_summaries[0].id, n("a"));
        assert_eq!(status.node_summaries[0].current_task, Some(TaskId::new(1)));
        assert_eq!(status.task_summaries[0].assigned_node, Some(n("a")));
    }
}
