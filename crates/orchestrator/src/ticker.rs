//! Background ticker driving escalation timers and adapter polling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use crate::engine::Orchestrator;

/// Handle to a running ticker.
pub struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Start ticking `orchestrator` every `period`.
    ///
    /// Each cycle polls the adapters for responses and blocked tasks, then
    /// fires due escalation entries at the orchestrator's current time.
    pub fn spawn(orchestrator: Arc<Orchestrator>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        info!(period = ?period, "Starting ticker");

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop.changed() => break,
                }

                if let Err(e) = orchestrator.poll_adapters().await {
                    error!(error = %e, "Adapter poll failed");
                }
                match orchestrator.tick(orchestrator.now()).await {
                    Ok(report) => debug!(fired = report.fired, "Tick complete"),
                    Err(e) => error!(error = %e, "Tick failed"),
                }
            }
            info!("Ticker stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop after the current cycle and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Ticker task panicked");
        }
    }
}
