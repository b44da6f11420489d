use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::engine::Engine;

/// Background task that periodically expires overdue pending bookings.
///
/// Runs forever; spawn it next to the engine. Each pass is bounded by
/// `EngineConfig::sweep_budget` — leftover work resumes on the next tick, so
/// a huge backlog never starves request handling.
pub async fn run_sweeper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(engine.config().sweep_interval);
    loop {
        interval.tick().await;
        sweep_once(&engine).await;
    }
}

/// One sweep pass. Idempotent: bookings that left `pending` between the scan
/// and the transition are skipped, so concurrent sweeps (or a sweep racing a
/// tutor's accept) are harmless.
pub async fn sweep_once(engine: &Engine) -> usize {
    let started = Instant::now();
    let now = engine.now();
    let overdue = engine.collect_expired(now);

    let mut expired = 0usize;
    for (booking_id, _tutor_id) in overdue {
        if started.elapsed() > engine.config().sweep_budget {
            debug!("sweep budget exhausted, resuming next tick");
            break;
        }
        match engine.expire_booking(booking_id).await {
            Ok(Some(_)) => {
                expired += 1;
                info!("expired stale pending booking {booking_id}");
            }
            Ok(None) => {} // already moved out of pending
            Err(e) => debug!("sweep skip {booking_id}: {e}"),
        }
    }

    metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    expired
}
