use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use voyage_shared::models::events::NotificationEvent;

use crate::booking::{Booking, BookingStatus};
use crate::inventory::{AllocationSlot, AllocationState, HoldResult, UnitRef};
use crate::payment::{Currency, Payment};
use crate::ReservationError;

/// Entry point to reservation storage.
///
/// Every mutation happens inside a [`StoreTx`]. Exclusivity of allocation
/// slots is enforced by the storage layer itself so that several service
/// instances can share one database.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, ReservationError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError>;

    /// Ids of pending bookings whose deadline is before `now`, oldest first,
    /// leaving out `exclude`.
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Uuid>, ReservationError>;

    async fn get_payment(&self, tran_id: &str) -> Result<Option<Payment>, ReservationError>;

    async fn allocation_state(
        &self,
        slot: &AllocationSlot,
    ) -> Result<AllocationState, ReservationError>;
}

/// One all-or-nothing unit of work. Dropping it without `commit` rolls back.
#[async_trait]
pub trait StoreTx: Send {
    /// Atomically claim a slot for a booking. The decision and the record are one write.
    async fn try_hold(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
        item_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<HoldResult, ReservationError>;

    /// Remove a non-confirmed allocation of `booking_id`. Returns whether a record was removed.
    async fn release(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
    ) -> Result<bool, ReservationError>;

    /// Make a held allocation permanent. Returns whether a hold was converted.
    async fn confirm(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
    ) -> Result<bool, ReservationError>;

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), ReservationError>;

    /// Load a booking and lock it until the end of the transaction.
    async fn lock_booking(&mut self, id: Uuid) -> Result<Option<Booking>, ReservationError>;

    async fn set_booking_status(
        &mut self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<(), ReservationError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), ReservationError>;

    /// Load a payment by transaction id and lock it until the end of the transaction.
    async fn lock_payment(&mut self, tran_id: &str) -> Result<Option<Payment>, ReservationError>;

    async fn update_payment(
        &mut self,
        payment: &Payment,
        provider_payload: Option<&serde_json::Value>,
    ) -> Result<(), ReservationError>;

    async fn tran_id_exists(&mut self, tran_id: &str) -> Result<bool, ReservationError>;

    async fn commit(self: Box<Self>) -> Result<(), ReservationError>;

    async fn rollback(self: Box<Self>) -> Result<(), ReservationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitPrice {
    pub amount: Decimal,
    pub currency: Currency,
}

/// Read-only view of the external catalog: does the unit exist and what does it cost.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn price_of(&self, unit: &UnitRef) -> Result<Option<UnitPrice>, ReservationError>;
}

/// Fire-and-forget notification dispatch. Must not block or fail the caller.
pub trait BookingNotifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Logs notifications instead of sending them anywhere.
pub struct LogNotifier;

impl BookingNotifier for LogNotifier {
    fn notify(&self, event: NotificationEvent) {
        tracing::debug!("Notification {} for {}", event.topic(), event.key());
    }
}
