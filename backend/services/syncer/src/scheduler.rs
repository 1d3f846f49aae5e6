use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::connector::{SinkGateway, SourceStore};
use crate::engine::{SyncEngine, SyncError};

/// Runs sync cycles back to back on a fixed interval.
pub struct Scheduler<S, K> {
    engine: SyncEngine<S, K>,
    interval: Duration,
}

impl<S, K> Scheduler<S, K>
where
    S: SourceStore,
    K: SinkGateway,
{
    pub fn new(engine: SyncEngine<S, K>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs forever. Returns only when the first cycle hits a fatal error;
    /// failures in later cycles are logged and the next tick retries.
    pub async fn run(mut self) -> Result<(), SyncError> {
        match self.engine.run_cycle().await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "initial sync failed");
                return Err(e);
            }
            Err(e) => tracing::warn!(
                error = %e,
                cursor = %self.engine.cursor().get(),
                "initial sync ended early, cursor kept"
            ),
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.engine.run_cycle().await {
                let cursor = self.engine.cursor().get();
                if e.is_fatal() {
                    tracing::error!(error = %e, cursor = %cursor, "sync cycle aborted");
                } else {
                    tracing::warn!(error = %e, cursor = %cursor, "sync cycle ended early");
                }
            }
        }
    }
}
