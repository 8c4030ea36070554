//! Periodic driver for [`EscalationEngine::process_due`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::service::EscalationEngine;

pub struct EscalationSweeper {
    engine: Arc<EscalationEngine>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl EscalationSweeper {
    pub fn new(engine: Arc<EscalationEngine>, interval: Duration, cancellation_token: CancellationToken) -> Self {
        Self {
            engine,
            interval,
            cancellation_token,
        }
    }

    /// Sweeper running at the engine's configured cadence.
    pub fn from_engine(engine: Arc<EscalationEngine>, cancellation_token: CancellationToken) -> Self {
        let interval = engine.config().sweep_interval;
        Self::new(engine, interval, cancellation_token)
    }

    /// Spawn the sweep loop. The first sweep runs immediately; the loop
    /// ends when the token is cancelled. A sweep in progress is finished
    /// first, so no claimed record is abandoned mid-dispatch.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Escalation sweeper started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = self.cancellation_token.cancelled() => {
                        debug!("Escalation sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let summary = self.engine.process_due().await;
                        debug!(?summary, "Sweep finished");
                    }
                }
            }

            info!("Escalation sweeper stopped");
        })
    }
}
