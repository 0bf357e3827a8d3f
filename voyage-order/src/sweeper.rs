use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use voyage_core::repository::ReservationStore;
use voyage_core::ReservationError;

use crate::booking::BookingManager;

/// What one sweep pass did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    /// Overdue bookings found.
    pub scanned: usize,
    pub expired: usize,
    /// Left `pending` between the scan and the lock, e.g. paid meanwhile.
    pub skipped: usize,
    pub failed: Vec<(Uuid, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reclaims inventory from pending bookings past their deadline.
pub struct ExpirySweeper {
    store: Arc<dyn ReservationStore>,
    bookings: Arc<BookingManager>,
    batch_size: i64,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn ReservationStore>, bookings: Arc<BookingManager>, batch_size: i64) -> Self {
        Self { store, bookings, batch_size: batch_size.max(1) }
    }

    /// One pass. Each booking is its own transaction; a failure is recorded in
    /// the report and the pass moves on. Only a failing scan is an error.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, ReservationError> {
        let mut report = SweepReport::default();
        // Ids this pass already handled without expiring; never fetched again.
        let mut passed_over: Vec<Uuid> = Vec::new();

        loop {
            let due = self
                .store
                .find_expired_pending(now, self.batch_size, &passed_over)
                .await?;
            let batch_len = due.len();

            for booking_id in due {
                report.scanned += 1;
                match self.bookings.mark_expired(booking_id).await {
                    Ok(outcome) if outcome.is_applied() => report.expired += 1,
                    Ok(_) => {
                        report.skipped += 1;
                        passed_over.push(booking_id);
                    }
                    Err(e) => {
                        error!("Failed to expire booking {}: {}", booking_id, e);
                        report.failed.push((booking_id, e.to_string()));
                        passed_over.push(booking_id);
                    }
                }
            }

            if (batch_len as i64) < self.batch_size {
                break;
            }
        }

        if report.scanned > 0 {
            info!(
                "Sweep finished: {} scanned, {} expired, {} skipped, {} failed",
                report.scanned,
                report.expired,
                report.skipped,
                report.failed.len()
            );
        }
        Ok(report)
    }
}
