use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::inventory::UnitRef;
use crate::payment::Currency;
use crate::ReservationError;

/// How long a pending booking holds its inventory.
pub const DEFAULT_HOLD_WINDOW_SECONDS: i64 = 600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "paid" => Ok(BookingStatus::Paid),
            "expired" => Ok(BookingStatus::Expired),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(ReservationError::Storage(format!("unknown booking status: {}", other))),
        }
    }
}

/// Result of a requested status transition. Only `pending -> expired` and
/// `pending -> paid` apply; every other request leaves the booking untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyFinal(BookingStatus),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// A customer's reservation and its line items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub owner_id: String,
    pub items: Vec<BookingItem>,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// Inert once the booking leaves `pending`.
    pub expires_at: DateTime<Utc>,
}

impl Booking {
    pub fn new_pending(
        owner_id: String,
        currency: Currency,
        now: DateTime<Utc>,
        hold_window: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            currency,
            status: BookingStatus::Pending,
            created_at: now,
            expires_at: now + hold_window,
        }
    }

    pub fn add_item(&mut self, unit: UnitRef, unit_price: Decimal) -> &BookingItem {
        let item = BookingItem::new(self.id, unit, unit_price);
        self.total_amount += item.total;
        self.items.push(item);
        &self.items[self.items.len() - 1]
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && self.expires_at < now
    }

    pub fn mark_paid(&mut self) -> TransitionOutcome {
        self.transition(BookingStatus::Paid)
    }

    pub fn mark_expired(&mut self) -> TransitionOutcome {
        self.transition(BookingStatus::Expired)
    }

    fn transition(&mut self, to: BookingStatus) -> TransitionOutcome {
        match (self.status, to) {
            (BookingStatus::Pending, BookingStatus::Paid)
            | (BookingStatus::Pending, BookingStatus::Expired) => {
                self.status = to;
                TransitionOutcome::Applied
            }
            (current, _) => TransitionOutcome::AlreadyFinal(current),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub unit: UnitRef,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl BookingItem {
    pub fn new(booking_id: Uuid, unit: UnitRef, unit_price: Decimal) -> Self {
        let quantity = unit.quantity();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            unit,
            quantity,
            unit_price,
            total: unit_price * Decimal::from(quantity),
        }
    }
}
