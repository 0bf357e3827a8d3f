use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use voyage_core::repository::BookingNotifier;
use voyage_core::{Currency, PaymentMode, UnitRef};
use voyage_payment::MockPaymentGateway;
use voyage_shared::models::events::NotificationEvent;
use voyage_shared::Masked;
use voyage_store::{MemoryStore, StaticCatalog};

use crate::{BookingManager, PaymentOrchestrator, PaymentReconciler};

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn topics(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.topic()).collect()
    }
}

impl BookingNotifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct World {
    pub store: MemoryStore,
    pub gateway: Arc<MockPaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub bookings: BookingManager,
    pub payments: PaymentOrchestrator,
    pub reconciler: PaymentReconciler,
    pub seats: Vec<UnitRef>,
}

pub const WEBHOOK_SECRET: &str = "whsec";

pub fn world(webhook_secret: Option<&str>) -> World {
    let schedule_id = Uuid::new_v4();
    let seats: Vec<UnitRef> = (0..3)
        .map(|_| UnitRef::Seat { schedule_id, seat_id: Uuid::new_v4() })
        .collect();
    let catalog = seats.iter().fold(StaticCatalog::new(), |c, s| {
        c.with_seat(s.unit_id(), Decimal::new(1250, 2), Currency::Usd)
    });

    let store = MemoryStore::new();
    let gateway = Arc::new(MockPaymentGateway::new(PaymentMode::Purchase));
    let notifier = Arc::new(RecordingNotifier::default());

    World {
        bookings: BookingManager::new(Arc::new(store.clone()), Arc::new(catalog), notifier.clone()),
        payments: PaymentOrchestrator::new(Arc::new(store.clone()), gateway.clone(), notifier.clone()),
        reconciler: PaymentReconciler::new(
            Arc::new(store.clone()),
            gateway.clone(),
            notifier.clone(),
            webhook_secret.map(|s| Masked::new(s.to_string())),
        ),
        store,
        gateway,
        notifier,
        seats,
    }
}
