use coachline_core::clock::Clock;
use coachline_core::events::EventPublisher;
use coachline_core::repository::BookingStore;
use coachline_order::{BookingTransactionManager, ExpiryReaper, ReservationCoordinator};
use coachline_payment::{PaymentService, RefundClient};
use coachline_shared::pii::Masked;
use coachline_store::app_config::{BusinessRules, VnpayConfig};
use coachline_store::RedisClient;
use std::sync::Arc;

use crate::middleware::resiliency::Resiliency;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationCoordinator>,
    pub bookings: Arc<BookingTransactionManager>,
    pub payments: Arc<PaymentService>,
    pub reaper: Arc<ExpiryReaper>,
    pub events: Arc<dyn EventPublisher>,
    pub redis: Option<Arc<RedisClient>>,
    pub resiliency: Arc<Resiliency>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

/// Everything the engine needs from the outside world.
pub struct Dependencies {
    pub store: Arc<dyn BookingStore>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn EventPublisher>,
    pub refunds: Arc<dyn RefundClient>,
    pub redis: Option<Arc<RedisClient>>,
}

impl AppState {
    pub fn new(deps: Dependencies, rules: BusinessRules, vnpay: VnpayConfig, jwt_secret: Masked<String>) -> Self {
        let Dependencies {
            store,
            clock,
            events,
            refunds,
            redis,
        } = deps;

        Self {
            reservations: Arc::new(ReservationCoordinator::new(store.clone(), clock.clone(), &rules)),
            bookings: Arc::new(BookingTransactionManager::new(store.clone(), clock.clone(), &rules)),
            payments: Arc::new(PaymentService::new(
                store.clone(),
                clock.clone(),
                events.clone(),
                refunds,
                vnpay,
                &rules,
            )),
            reaper: Arc::new(ExpiryReaper::new(store, clock, events.clone(), &rules)),
            events,
            redis,
            resiliency: Arc::new(Resiliency::default()),
            auth: AuthConfig { secret: jwt_secret },
            business_rules: rules,
        }
    }
}
