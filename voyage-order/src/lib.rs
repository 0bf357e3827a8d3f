pub mod booking;
pub mod extract;
pub mod ledger;
pub mod orchestrator;
pub mod reconciler;
pub mod sweeper;

#[cfg(test)]
mod test_support;

pub use booking::BookingManager;
pub use orchestrator::{PaymentInitiation, PaymentOrchestrator};
pub use reconciler::{PaymentReconciler, ReconcileAction, ReconcileOutcome};
pub use sweeper::{ExpirySweeper, SweepReport};
