//! drover demo binary.
//!
//! Runs the coordinator in-process with a simulated runway data source and a
//! fleet of simulated worker nodes, some of which fail or go silent.
//!
//! ```text
//! drover [config.toml]          # default: drover.toml
//! RUST_LOG=drover=debug drover
//! DROVER_SCHEDULER__NODE_TIMEOUT=10 DROVER_DEMO__WORKERS=5 drover
//! ```

mod config;
mod source;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use drover_core::ports::{Clock, SystemClock};
use drover_core::{Coordinator, SchedulerLoop};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::source::SimulatedRunwaySource;
use crate::worker::WorkerFleet;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("drover=info".parse()?))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "drover.toml".to_string());
    let config = CliConfig::load(&path)?;
    info!(
        config = %path,
        tick_interval_secs = config.drover.scheduler.tick_interval.as_secs(),
        task_timeout_secs = config.drover.scheduler.task_timeout.as_secs(),
        node_timeout_secs = config.drover.scheduler.node_timeout.as_secs(),
        max_attempts = config.drover.tasks.max_attempts,
        workers = config.demo.workers,
        "configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let coordinator = Arc::new(Coordinator::new(config.drover.clone(), Arc::clone(&clock)));
    let source = Arc::new(SimulatedRunwaySource::new(clock, &config.demo));

    let scheduler = SchedulerLoop::new(Arc::clone(&coordinator), source).spawn();
    let fleet = WorkerFleet::spawn(Arc::clone(&coordinator), &config.demo);

    let (status_tx, status_rx) = watch::channel(false);
    let reporter = tokio::spawn(report_status(
        Arc::clone(&coordinator),
        config.demo.status_interval(),
        status_rx,
    ));

    if config.demo.run_secs > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.demo.run_secs)) => {
                info!(run_secs = config.demo.run_secs, "demo finished");
            }
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("interrupted");
    }

    fleet.shutdown_and_join().await;
    scheduler.shutdown_and_join().await;
    let _ = status_tx.send(true);
    if let Err(err) = reporter.await {
        warn!(error = %err, "status reporter panicked");
    }

    let status = coordinator.get_status().await;
    info!(snapshot = %serde_json::to_string(&status)?, "final status");
    Ok(())
}

/// Log a JSON status snapshot every `every`.
async fn report_status(
    coordinator: Arc<Coordinator>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let status = coordinator.get_status().await;
                info!(
                    pending = status.pending_depth,
                    completed = status.tasks.completed,
                    failed = status.tasks.failed,
                    nodes_dead = status.nodes.dead,
                    "status"
                );
                match serde_json::to_string(&status) {
                    Ok(json) => tracing::debug!(snapshot = %json, "status snapshot"),
                    Err(err) => warn!(error = %err, "status snapshot not serializable"),
                }
            }
        }
    }
}
