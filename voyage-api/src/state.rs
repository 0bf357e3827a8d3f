use chrono::Duration;
use std::sync::Arc;
use voyage_core::payment::PaymentGateway;
use voyage_core::repository::{BookingNotifier, CatalogLookup, ReservationStore};
use voyage_order::{BookingManager, ExpirySweeper, PaymentOrchestrator, PaymentReconciler};
use voyage_shared::Masked;
use voyage_store::app_config::BusinessRules;

use crate::middleware::RateLimiter;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReservationStore>,
    pub bookings: Arc<BookingManager>,
    pub payments: Arc<PaymentOrchestrator>,
    pub reconciler: Arc<PaymentReconciler>,
    /// Rate limiting is off without a limiter.
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

/// The seams `AppState` is wired from. Postgres and PayWay in `main`, in-memory fakes in tests.
pub struct Services {
    pub store: Arc<dyn ReservationStore>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn BookingNotifier>,
    pub webhook_secret: Option<Masked<String>>,
}

impl AppState {
    pub fn new(
        services: Services,
        rate_limiter: Option<Arc<dyn RateLimiter>>,
        auth: AuthConfig,
        business_rules: BusinessRules,
    ) -> Self {
        let Services { store, catalog, gateway, notifier, webhook_secret } = services;

        let bookings = BookingManager::new(store.clone(), catalog, notifier.clone())
            .with_hold_window(Duration::seconds(business_rules.hold_window_seconds));
        let payments = PaymentOrchestrator::new(store.clone(), gateway.clone(), notifier.clone());
        let reconciler = PaymentReconciler::new(store.clone(), gateway, notifier, webhook_secret);

        Self {
            store,
            bookings: Arc::new(bookings),
            payments: Arc::new(payments),
            reconciler: Arc::new(reconciler),
            rate_limiter,
            auth,
            business_rules,
        }
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            self.store.clone(),
            self.bookings.clone(),
            self.business_rules.sweep_batch_size,
        )
    }
}
