use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use voyage_core::repository::{ReservationStore, StoreTx};
use voyage_core::{
    AllocationSlot, AllocationState, Booking, BookingStatus, HoldResult, Payment, ReservationError,
};

#[derive(Debug, Clone)]
struct AllocationRecord {
    booking_id: Uuid,
    #[allow(dead_code)]
    item_id: Uuid,
    held_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<String, (Payment, Option<Value>)>,
    allocations: HashMap<AllocationSlot, AllocationRecord>,
}

/// In-process store with the same transactional semantics as Postgres.
///
/// Transactions serialise on one async mutex and restore a snapshot unless
/// committed, so an aborted unit of work leaves nothing behind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing: Arc<std::sync::Mutex<HashSet<Uuid>>>,
    confirmations: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every locked read of `booking_id` fail, to exercise failure isolation.
    pub fn fail_booking(&self, booking_id: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(booking_id);
        }
    }

    /// Committed hold-to-confirmed conversions so far.
    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }

    /// Allocation slots currently owned by `booking_id`.
    pub async fn allocations_of(&self, booking_id: Uuid) -> Vec<AllocationSlot> {
        let state = self.state.lock().await;
        let mut slots: Vec<AllocationSlot> = state
            .allocations
            .iter()
            .filter(|(_, r)| r.booking_id == booking_id)
            .map(|(s, _)| s.clone())
            .collect();
        slots.sort();
        slots
    }

    /// Raw provider payload last stored for a payment.
    pub async fn provider_payload(&self, tran_id: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.payments.get(tran_id).and_then(|(_, p)| p.clone())
    }

    /// Force a booking's deadline, for time-travel in tests.
    pub async fn set_expires_at(&self, booking_id: Uuid, expires_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(b) = state.bookings.get_mut(&booking_id) {
            b.expires_at = expires_at;
        }
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
    failing: Arc<std::sync::Mutex<HashSet<Uuid>>>,
    confirmations: Arc<AtomicUsize>,
    pending_confirmations: usize,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, ReservationError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemoryTx {
            guard,
            snapshot,
            failing: self.failing.clone(),
            confirmations: self.confirmations.clone(),
            pending_confirmations: 0,
        }))
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Uuid>, ReservationError> {
        let state = self.state.lock().await;
        let mut due: Vec<&Booking> = state
            .bookings
            .values()
            .filter(|b| b.is_overdue(now) && !exclude.contains(&b.id))
            .collect();
        due.sort_by_key(|b| (b.expires_at, b.id));
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|b| b.id)
            .collect())
    }

    async fn get_payment(&self, tran_id: &str) -> Result<Option<Payment>, ReservationError> {
        Ok(self.state.lock().await.payments.get(tran_id).map(|(p, _)| p.clone()))
    }

    async fn allocation_state(
        &self,
        slot: &AllocationSlot,
    ) -> Result<AllocationState, ReservationError> {
        let state = self.state.lock().await;
        Ok(match state.allocations.get(slot) {
            None => AllocationState::Free,
            Some(AllocationRecord { booking_id, held_until: None, .. }) => {
                AllocationState::Confirmed { booking_id: *booking_id }
            }
            Some(AllocationRecord { booking_id, held_until: Some(until), .. }) => {
                AllocationState::Held { booking_id: *booking_id, until: *until }
            }
        })
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn try_hold(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
        item_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<HoldResult, ReservationError> {
        if self.guard.allocations.contains_key(slot) {
            return Ok(HoldResult::Conflict);
        }
        self.guard.allocations.insert(
            slot.clone(),
            AllocationRecord { booking_id, item_id, held_until: Some(until) },
        );
        Ok(HoldResult::Granted)
    }

    async fn release(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
    ) -> Result<bool, ReservationError> {
        let held_by_booking = matches!(
            self.guard.allocations.get(slot),
            Some(r) if r.booking_id == booking_id && r.held_until.is_some()
        );
        if held_by_booking {
            self.guard.allocations.remove(slot);
        }
        Ok(held_by_booking)
    }

    async fn confirm(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
    ) -> Result<bool, ReservationError> {
        match self.guard.allocations.get_mut(slot) {
            Some(r) if r.booking_id == booking_id && r.held_until.is_some() => {
                r.held_until = None;
                self.pending_confirmations += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), ReservationError> {
        if self.guard.bookings.contains_key(&booking.id) {
            return Err(ReservationError::Storage(format!("duplicate booking {}", booking.id)));
        }
        self.guard.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn lock_booking(&mut self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
        let failing = self.failing.lock().map(|f| f.contains(&id)).unwrap_or(false);
        if failing {
            return Err(ReservationError::Storage(format!("injected failure for booking {}", id)));
        }
        Ok(self.guard.bookings.get(&id).cloned())
    }

    async fn set_booking_status(
        &mut self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<(), ReservationError> {
        match self.guard.bookings.get_mut(&id) {
            Some(b) => {
                b.status = status;
                Ok(())
            }
            None => Err(ReservationError::BookingNotFound(id)),
        }
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), ReservationError> {
        if self.guard.payments.contains_key(&payment.tran_id) {
            return Err(ReservationError::Storage(format!(
                "duplicate transaction id {}",
                payment.tran_id
            )));
        }
        self.guard
            .payments
            .insert(payment.tran_id.clone(), (payment.clone(), None));
        Ok(())
    }

    async fn lock_payment(&mut self, tran_id: &str) -> Result<Option<Payment>, ReservationError> {
        Ok(self.guard.payments.get(tran_id).map(|(p, _)| p.clone()))
    }

    async fn update_payment(
        &mut self,
        payment: &Payment,
        provider_payload: Option<&Value>,
    ) -> Result<(), ReservationError> {
        let Some(entry) = self.guard.payments.get_mut(&payment.tran_id) else {
            return Err(ReservationError::UnknownTransaction(payment.tran_id.clone()));
        };
        entry.0 = payment.clone();
        if let Some(payload) = provider_payload {
            entry.1 = Some(payload.clone());
        }
        Ok(())
    }

    async fn tran_id_exists(&mut self, tran_id: &str) -> Result<bool, ReservationError> {
        Ok(self.guard.payments.contains_key(tran_id))
    }

    async fn commit(self: Box<Self>) -> Result<(), ReservationError> {
        let mut this = self;
        this.snapshot = None;
        this.confirmations
            .fetch_add(this.pending_confirmations, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ReservationError> {
        Ok(())
    }
}
