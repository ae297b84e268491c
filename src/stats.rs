//! Periodic traffic stats reporter (§4.9): once a minute, swaps the shared
//! byte counters to zero and logs the totals if anything moved.

use crate::relay::Counters;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Runs forever, reporting non-zero traffic once per minute. Ticks are
/// aligned to the interval boundary rather than to wall-clock minutes,
/// since the exact phase doesn't matter for a plain rate counter.
pub async fn run(counters: Arc<Counters>, quiet: bool) {
    let mut ticker = tokio::time::interval_at(Instant::now() + REPORT_INTERVAL, REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let (bytes_in, bytes_out) = counters.take();
        if quiet || (bytes_in == 0 && bytes_out == 0) {
            continue;
        }
        info!(bytes_in, bytes_out, "traffic in the last interval");
    }
}

/// Seconds since the Unix epoch, used only for the startup log line; never
/// called from request-handling code paths.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
