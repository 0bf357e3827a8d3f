pub mod booking;
pub mod inventory;
pub mod payment;
pub mod repository;

use uuid::Uuid;

pub use booking::{Booking, BookingItem, BookingStatus, TransitionOutcome};
pub use inventory::{AllocationSlot, AllocationState, HoldResult, ItemKind, UnitRef};
pub use payment::{Currency, Payment, PaymentMode, PaymentStatus};

/// Failure taxonomy of the reservation and payment subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    /// Recoverable: the customer should pick other units.
    #[error("Inventory unavailable: {}", describe_units(.units))]
    InventoryConflict { units: Vec<UnitRef> },

    /// Transient: the caller may retry with backoff.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Terminal for this attempt: the customer must start a new payment.
    #[error("Payment gateway rejected the request ({code}): {message}")]
    GatewayRejected { code: String, message: String },

    #[error("Webhook signature is missing or invalid")]
    SignatureInvalid,

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("No transaction id found in payload")]
    MissingTransactionId,

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Booking {booking_id} cannot be paid in status {status}")]
    BookingNotPayable { booking_id: Uuid, status: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

fn describe_units(units: &[UnitRef]) -> String {
    units.iter().map(|u| u.to_string()).collect::<Vec<_>>().join(", ")
}

pub type ReservationResult<T> = Result<T, ReservationError>;
