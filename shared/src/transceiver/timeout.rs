//! Periodic eviction of timed-out requests

use super::Transceiver;
use std::sync::Weak;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, warn};

/// Shortest period the sweeper runs at; a zero period is raised to this
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Sweeps the pending table on a fixed period, independent of traffic
pub struct TimeoutSweeper {
    transceiver: Weak<Transceiver>,
    check_interval: Duration,
}

impl TimeoutSweeper {
    /// Create a new sweeper for a transceiver
    pub fn new(transceiver: Weak<Transceiver>, check_interval: Duration) -> Self {
        if check_interval < MIN_SWEEP_INTERVAL {
            warn!(?check_interval, "Sweep interval too short, using {:?}", MIN_SWEEP_INTERVAL);
        }

        Self {
            transceiver,
            check_interval: check_interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// Run the sweep loop until the task is aborted
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);

        loop {
            ticker.tick().await;

            let Some(transceiver) = self.transceiver.upgrade() else {
                continue;
            };

            let evicted = transceiver.sweep().await;
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "Timeout sweep evicted pending requests");
            }
        }
    }
}
