use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use voyage_core::booking::DEFAULT_HOLD_WINDOW_SECONDS;
use voyage_core::repository::{BookingNotifier, CatalogLookup, ReservationStore, StoreTx};
use voyage_core::{
    Booking, BookingItem, BookingStatus, HoldResult, ReservationError, TransitionOutcome, UnitRef,
};
use voyage_shared::models::events::{BookingStatusChangedEvent, NotificationEvent};

use crate::ledger;

/// Creates bookings and drives their status transitions.
pub struct BookingManager {
    store: Arc<dyn ReservationStore>,
    catalog: Arc<dyn CatalogLookup>,
    notifier: Arc<dyn BookingNotifier>,
    hold_window: Duration,
}

impl BookingManager {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        catalog: Arc<dyn CatalogLookup>,
        notifier: Arc<dyn BookingNotifier>,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
            hold_window: Duration::seconds(DEFAULT_HOLD_WINDOW_SECONDS),
        }
    }

    pub fn with_hold_window(mut self, hold_window: Duration) -> Self {
        self.hold_window = hold_window;
        self
    }

    pub async fn create(&self, owner_id: &str, units: Vec<UnitRef>) -> Result<Booking, ReservationError> {
        self.create_at(owner_id, units, Utc::now()).await
    }

    /// Hold every requested unit and persist a pending booking, all or nothing.
    ///
    /// Every unit is tried so that a conflict names all unavailable units, not just the first.
    pub async fn create_at(
        &self,
        owner_id: &str,
        units: Vec<UnitRef>,
        now: DateTime<Utc>,
    ) -> Result<Booking, ReservationError> {
        if owner_id.trim().is_empty() {
            return Err(ReservationError::Validation("owner is required".to_string()));
        }
        validate_units(&units)?;

        let mut priced = Vec::with_capacity(units.len());
        for unit in units {
            let price = self.catalog.price_of(&unit).await?.ok_or_else(|| {
                ReservationError::Validation(format!("unknown unit: {}", unit))
            })?;
            priced.push((unit, price));
        }

        let currency = priced[0].1.currency;
        if priced.iter().any(|(_, p)| p.currency != currency) {
            return Err(ReservationError::Validation(
                "all items of a booking must share one currency".to_string(),
            ));
        }

        let minor_units = currency.minor_units();
        if let Some((unit, price)) = priced.iter().find(|(_, p)| p.amount.round_dp(minor_units) != p.amount) {
            return Err(ReservationError::Validation(format!(
                "price {} of {} is not a whole amount of {}",
                price.amount, unit, currency
            )));
        }

        let mut booking = Booking::new_pending(owner_id.to_string(), currency, now, self.hold_window);
        for (unit, price) in priced {
            booking.add_item(unit, price.amount);
        }

        let mut tx = self.store.begin().await?;
        tx.insert_booking(&booking).await?;

        let mut unavailable = Vec::new();
        for item in hold_order(&booking.items) {
            let held = ledger::try_hold(tx.as_mut(), &item.unit, booking.id, item.id, booking.expires_at).await?;
            if held == HoldResult::Conflict {
                unavailable.push(item.unit.clone());
            }
        }

        if !unavailable.is_empty() {
            tx.rollback().await?;
            info!(
                "Booking for {} rejected: {} of {} units unavailable",
                owner_id,
                unavailable.len(),
                booking.items.len()
            );
            return Err(ReservationError::InventoryConflict { units: unavailable });
        }

        tx.commit().await?;
        info!(
            "Booking {} created for {}: {} items, total {} {}, expires at {}",
            booking.id,
            booking.owner_id,
            booking.items.len(),
            booking.total_amount,
            booking.currency,
            booking.expires_at
        );
        self.notifier.notify(status_event(&booking));
        Ok(booking)
    }

    /// A booking as its owner sees it. Other owners get `BookingNotFound`.
    pub async fn get_for_owner(&self, booking_id: Uuid, owner_id: &str) -> Result<Booking, ReservationError> {
        match self.store.get_booking(booking_id).await? {
            Some(b) if b.owner_id == owner_id => Ok(b),
            _ => Err(ReservationError::BookingNotFound(booking_id)),
        }
    }

    /// Expire a pending booking and free its inventory in one transaction.
    /// A booking that already left `pending` is left alone.
    pub async fn mark_expired(&self, booking_id: Uuid) -> Result<TransitionOutcome, ReservationError> {
        let mut tx = self.store.begin().await?;
        let mut booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or(ReservationError::BookingNotFound(booking_id))?;

        let outcome = expire(tx.as_mut(), &mut booking).await?;
        if !outcome.is_applied() {
            tx.rollback().await?;
            debug!("Booking {} not expired: {:?}", booking_id, outcome);
            return Ok(outcome);
        }

        tx.commit().await?;
        self.notifier.notify(status_event(&booking));
        Ok(outcome)
    }

    /// Mark a pending booking paid and confirm its inventory in one transaction.
    pub async fn mark_paid(&self, booking_id: Uuid) -> Result<TransitionOutcome, ReservationError> {
        let mut tx = self.store.begin().await?;
        let mut booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or(ReservationError::BookingNotFound(booking_id))?;

        let outcome = settle_paid(tx.as_mut(), &mut booking).await?;
        if !outcome.is_applied() {
            tx.rollback().await?;
            return Ok(outcome);
        }

        tx.commit().await?;
        self.notifier.notify(status_event(&booking));
        Ok(outcome)
    }
}

/// `pending -> expired` plus release of every hold, inside the caller's transaction.
pub(crate) async fn expire(
    tx: &mut dyn StoreTx,
    booking: &mut Booking,
) -> Result<TransitionOutcome, ReservationError> {
    let outcome = booking.mark_expired();
    if !outcome.is_applied() {
        return Ok(outcome);
    }

    let mut released = 0;
    for item in &booking.items {
        released += ledger::release(tx, &item.unit, booking.id).await?;
    }
    tx.set_booking_status(booking.id, BookingStatus::Expired).await?;
    info!("Booking {} expired, {} slots released", booking.id, released);
    Ok(outcome)
}

/// `pending -> paid` plus confirmation of every hold, inside the caller's transaction.
pub(crate) async fn settle_paid(
    tx: &mut dyn StoreTx,
    booking: &mut Booking,
) -> Result<TransitionOutcome, ReservationError> {
    let outcome = booking.mark_paid();
    if !outcome.is_applied() {
        return Ok(outcome);
    }

    let mut confirmed = 0;
    for item in &booking.items {
        confirmed += ledger::confirm(tx, &item.unit, booking.id).await?;
    }
    tx.set_booking_status(booking.id, BookingStatus::Paid).await?;
    info!("Booking {} paid, {} slots confirmed", booking.id, confirmed);
    Ok(outcome)
}

pub(crate) fn status_event(booking: &Booking) -> NotificationEvent {
    NotificationEvent::BookingStatusChanged(BookingStatusChangedEvent {
        booking_id: booking.id,
        owner_id: booking.owner_id.clone(),
        status: booking.status.as_str().to_string(),
        timestamp: Utc::now().timestamp(),
    })
}

/// Items sorted by their allocation keys. Concurrent bookings then take row
/// locks in one global order and cannot deadlock each other.
fn hold_order(items: &[BookingItem]) -> Vec<&BookingItem> {
    let mut ordered: Vec<&BookingItem> = items.iter().collect();
    ordered.sort_by_cached_key(|item| item.unit.slots());
    ordered
}

fn validate_units(units: &[UnitRef]) -> Result<(), ReservationError> {
    if units.is_empty() {
        return Err(ReservationError::Validation("a booking needs at least one item".to_string()));
    }

    let mut seen = HashSet::new();
    for unit in units {
        unit.validate()?;
        for slot in unit.slots() {
            if !seen.insert(slot) {
                return Err(ReservationError::Validation(format!(
                    "{} is requested more than once",
                    unit
                )));
            }
        }
    }
    Ok(())
}
