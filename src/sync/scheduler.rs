// src/sync/scheduler.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Orchestrator;

/// Handle to the background pass loop.
pub struct Scheduler {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    /// First pass runs immediately, then every `settings.interval`. A pass
    /// that overruns the interval swallows the missed ticks.
    pub fn spawn(orchestrator: Arc<Orchestrator>) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let period = orchestrator.settings().interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }
                // Finish the pass in flight before honoring a stop.
                let report = orchestrator.run_pass(Utc::now()).await;
                tracing::debug!(target: "sync", ?report, "scheduler tick");
                if *stopped.borrow() {
                    break;
                }
            }
            tracing::info!(target: "sync", "scheduler stopped");
        });
        Self { stop, task }
    }

    /// Signal the loop and wait for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(target: "sync", error = %e, "scheduler task ended abnormally");
        }
    }
}
