use crate::engine::Orchestrator;
use maestro_core::{MaestroError, MaestroResult};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Background ticker that runs [`Orchestrator::maintenance_tick`] on a fixed
/// period until shut down.
pub struct MaintenanceHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Spawn the ticker. The first tick fires one `period` after start.
    /// A zero period is a configuration error.
    pub fn start(orchestrator: Orchestrator, period: Duration) -> MaestroResult<Self> {
        if period.is_zero() {
            return Err(MaestroError::Configuration(
                "Maintenance period must be non-zero".to_string(),
            ));
        }
        let token = CancellationToken::new();
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs_f64(), "Maintenance loop started");
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = timer.tick() => {
                        debug!("Maintenance tick");
                        orchestrator.maintenance_tick().await;
                    }
                }
            }
            info!("Maintenance loop stopped");
        });

        Ok(Self { token, handle })
    }

    /// Whether the loop task is still alive.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the ticker and wait for an in-progress tick to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Maintenance loop ended abnormally");
        }
    }
}
