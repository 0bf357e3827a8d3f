use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use voyage_core::ReservationError;
use voyage_order::{ExpirySweeper, SweepReport};

/// Process exit codes of the one-shot `sweep` mode.
pub const EXIT_CLEAN: i32 = 0;
pub const EXIT_SYSTEMIC: i32 = 1;
pub const EXIT_PARTIAL: i32 = 2;

pub async fn start_expiry_worker(sweeper: ExpirySweeper, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Expiry worker started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        match sweeper.sweep_once(Utc::now()).await {
            Ok(report) if !report.is_clean() => {
                warn!("Sweep left {} bookings pending after errors", report.failed.len());
            }
            Ok(_) => {}
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}

pub async fn run_sweep_once(sweeper: &ExpirySweeper) -> i32 {
    let result = sweeper.sweep_once(Utc::now()).await;
    if let Err(e) = &result {
        error!("Sweep failed: {}", e);
    }
    exit_code(&result)
}

pub fn exit_code(result: &Result<SweepReport, ReservationError>) -> i32 {
    match result {
        Ok(report) if report.is_clean() => EXIT_CLEAN,
        Ok(_) => EXIT_PARTIAL,
        Err(_) => EXIT_SYSTEMIC,
    }
}
