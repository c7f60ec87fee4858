//! SchedulerLoop - 定期実行ドライバ
//!
//! # フロー（1 tick）
//! 1. Coordinator::sweep_dead() で沈黙ノードを Dead にし、保持タスクを回収
//! 2. Coordinator::sweep_timeouts() で期限切れの割り当てを回収
//! 3. TaskSource::next_batch() で新しい payload を取得し、タスクを作成
//!
//! どのステップの失敗もループを止めない。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::app::coordinator::{Coordinator, count_outcomes};
use crate::ports::TaskSource;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub nodes_marked_dead: usize,
    pub tasks_requeued: usize,
    pub tasks_failed: usize,
    pub tasks_created: usize,
    /// No new data upstream, or the source failed.
    pub generation_skipped: bool,
}

pub struct SchedulerLoop {
    coordinator: Arc<Coordinator>,
    source: Arc<dyn TaskSource>,
    tick_interval: Duration,
    max_tasks_per_cycle: usize,
}

impl SchedulerLoop {
    pub fn new(coordinator: Arc<Coordinator>, source: Arc<dyn TaskSource>) -> Self {
        let scheduler = &coordinator.config().scheduler;
        let tick_interval = scheduler.tick_interval;
        let max_tasks_per_cycle = scheduler.max_tasks_per_cycle;
        Self {
            coordinator,
            source,
            tick_interval,
            max_tasks_per_cycle,
        }
    }

    /// Run one scheduler cycle.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let dead = self.coordinator.sweep_dead().await;
        report.nodes_marked_dead = dead.dead_nodes.len();
        let (requeued, failed) = count_outcomes(&dead.released);
        report.tasks_requeued += requeued;
        report.tasks_failed += failed;

        let timeouts = self.coordinator.sweep_timeouts().await;
        let (requeued, failed) = count_outcomes(&timeouts);
        report.tasks_requeued += requeued;
        report.tasks_failed += failed;

        report.tasks_created = self.generate().await;
        report.generation_skipped = report.tasks_created == 0;
        report
    }

    /// Pull at most `max_tasks_per_cycle` payloads from the source.
    ///
    /// No store lock is held while the source is awaited.
    async fn generate(&self) -> usize {
        if self.max_tasks_per_cycle == 0 {
            return 0;
        }

        let batch = match self.source.next_batch(self.max_tasks_per_cycle).await {
            Ok(Some(batch)) if !batch.is_empty() => batch,
            Ok(_) => {
                tracing::debug!("upstream window empty, generation skipped");
                return 0;
            }
            Err(err) => {
                tracing::warn!(error = %err, "task source failed, retrying next tick");
                return 0;
            }
        };

        let mut created = 0;
        for payload in batch.into_iter().take(self.max_tasks_per_cycle) {
            let task = self.coordinator.create_task(payload).await;
            tracing::info!(task_id = %task.id, task_type = %task.task_type, "created task");
            created += 1;
        }
        created
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        SchedulerHandle { shutdown_tx, join }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        // interval() panics on a zero period.
        let period = self.tick_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_interval_ms = period.as_millis() as u64,
            max_tasks_per_cycle = self.max_tasks_per_cycle,
            "scheduler started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender dropped
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = self.tick().await;
            tracing::debug!(
                nodes_marked_dead = report.nodes_marked_dead,
                tasks_requeued = report.tasks_requeued,
                tasks_failed = report.tasks_failed,
                tasks_created = report.tasks_created,
                generation_skipped = report.generation_skipped,
                "scheduler tick"
            );
        }

        tracing::info!("scheduler stopped");
    }
}

/// Scheduler handle.
/// - `request_shutdown()` は次の tick 前にループを止める（実行中の tick は最後まで走る）
/// - `shutdown_and_join()` で終了を待てる
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "scheduler task panicked");
        }
    }
}
