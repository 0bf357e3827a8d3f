use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ReservationError;

/// Longest stay a single room item may span.
pub const MAX_ROOM_NIGHTS: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Seat,
    Room,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Seat => "seat",
            ItemKind::Room => "room",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seat" => Ok(ItemKind::Seat),
            "room" => Ok(ItemKind::Room),
            other => Err(ReservationError::Validation(format!("unknown item kind: {}", other))),
        }
    }
}

/// A sellable unit as requested by a customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnitRef {
    /// A bus seat on one schedule (departure).
    Seat { schedule_id: Uuid, seat_id: Uuid },
    /// A hotel room for the nights in `[check_in, check_out)`.
    Room {
        room_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
}

impl UnitRef {
    pub fn kind(&self) -> ItemKind {
        match self {
            UnitRef::Seat { .. } => ItemKind::Seat,
            UnitRef::Room { .. } => ItemKind::Room,
        }
    }

    pub fn unit_id(&self) -> Uuid {
        match self {
            UnitRef::Seat { seat_id, .. } => *seat_id,
            UnitRef::Room { room_id, .. } => *room_id,
        }
    }

    pub fn validate(&self) -> Result<(), ReservationError> {
        if let UnitRef::Room { check_in, check_out, .. } = self {
            let nights = (*check_out - *check_in).num_days();
            if nights <= 0 {
                return Err(ReservationError::Validation(format!(
                    "room {}: check_out must be after check_in",
                    self.unit_id()
                )));
            }
            if nights > MAX_ROOM_NIGHTS {
                return Err(ReservationError::Validation(format!(
                    "room {}: stay of {} nights exceeds {}",
                    self.unit_id(),
                    nights,
                    MAX_ROOM_NIGHTS
                )));
            }
        }
        Ok(())
    }

    /// Number of priced units: 1 for a seat, nights for a room.
    pub fn quantity(&self) -> i32 {
        match self {
            UnitRef::Seat { .. } => 1,
            UnitRef::Room { check_in, check_out, .. } => {
                (*check_out - *check_in).num_days().max(0) as i32
            }
        }
    }

    /// The allocation records this unit occupies. Exclusivity is enforced per slot.
    pub fn slots(&self) -> Vec<AllocationSlot> {
        match self {
            UnitRef::Seat { schedule_id, seat_id } => vec![AllocationSlot {
                kind: ItemKind::Seat,
                unit_id: *seat_id,
                slot: schedule_id.to_string(),
            }],
            UnitRef::Room { room_id, check_in, .. } => (0..self.quantity() as i64)
                .map(|n| AllocationSlot {
                    kind: ItemKind::Room,
                    unit_id: *room_id,
                    slot: (*check_in + Duration::days(n)).format("%Y-%m-%d").to_string(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitRef::Seat { schedule_id, seat_id } => {
                write!(f, "seat {} on schedule {}", seat_id, schedule_id)
            }
            UnitRef::Room { room_id, check_in, check_out } => {
                write!(f, "room {} from {} to {}", room_id, check_in, check_out)
            }
        }
    }
}

/// The storage key of one allocation: (kind, unit, slot).
/// For seats the slot is the schedule id; for rooms it is the night (`YYYY-MM-DD`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationSlot {
    pub kind: ItemKind,
    pub unit_id: Uuid,
    pub slot: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldResult {
    Granted,
    Conflict,
}

/// Derived allocation state of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationState {
    Free,
    Held { booking_id: Uuid, until: DateTime<Utc> },
    Confirmed { booking_id: Uuid },
}

impl AllocationState {
    pub fn is_free(&self) -> bool {
        matches!(self, AllocationState::Free)
    }
}
