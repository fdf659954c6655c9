//! Background sweeps that return abandoned inventory to sale.
//!
//! Two independent loops run on their own intervals: one clears lapsed seat
//! locks, the other expires bookings whose approval or payment deadline has
//! passed. A failed sweep is logged and retried on the next tick.

use coachline_core::clock::Clock;
use coachline_core::events::{publish_event, EventPublisher};
use coachline_core::repository::BookingStore;
use coachline_core::CoreResult;
use coachline_shared::models::events::{topics, BookingEvent};
use coachline_shared::{ApprovalStatus, Booking, BookingId, PaymentStatus};
use coachline_store::app_config::BusinessRules;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::settlement;

pub struct ExpiryReaper {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    lock_interval: Duration,
    booking_interval: Duration,
}

impl ExpiryReaper {
    pub fn new(
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
        rules: &BusinessRules,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            lock_interval: Duration::from_secs(rules.lock_sweep_seconds.max(1)),
            booking_interval: Duration::from_secs(rules.booking_sweep_seconds.max(1)),
        }
    }

    /// Releases every seat whose lock lapsed.
    pub async fn sweep_seat_locks(&self) -> CoreResult<u64> {
        let released = self.store.release_expired_locks(self.clock.now()).await?;
        if released > 0 {
            info!("Released {} expired seat locks", released);
        }
        Ok(released)
    }

    /// Expires overdue bookings one by one and frees their seats.
    pub async fn sweep_bookings(&self) -> CoreResult<Vec<Booking>> {
        let now = self.clock.now();
        let candidates = self.store.expired_booking_ids(now).await?;

        let mut expired = Vec::with_capacity(candidates.len());
        for booking_id in candidates {
            // A single stuck booking must not block the rest of the batch
            match self.expire_booking(booking_id).await {
                Ok(Some(booking)) => expired.push(booking),
                Ok(None) => {}
                Err(e) => error!("Failed to expire booking {}: {}", booking_id, e),
            }
        }

        for booking in &expired {
            let event = BookingEvent::from_booking(booking, "expired", now.timestamp());
            publish_event(self.events.as_ref(), topics::BOOKING_EXPIRED, &booking.id.to_string(), &event)
                .await;
        }
        if !expired.is_empty() {
            info!("Expired {} bookings", expired.len());
        }
        Ok(expired)
    }

    async fn expire_booking(&self, booking_id: BookingId) -> CoreResult<Option<Booking>> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let Some(mut booking) = tx.booking_for_update(booking_id).await? else {
            return Ok(None);
        };
        // Approved or paid since the candidate scan
        if !booking.is_active() || !booking.deadline_passed(now) {
            return Ok(None);
        }

        let released = settlement::release_seats(tx.as_mut(), &booking).await?;
        booking.payment_status = PaymentStatus::Expired;
        booking.approval_status = ApprovalStatus::Cancelled;
        booking.touch(now);
        tx.save_booking(&booking).await?;
        tx.commit().await?;

        info!("Booking {} expired, {} seats released", booking_id, released);
        Ok(Some(booking))
    }

    /// Spawns both sweep loops. They run until [`ReaperHandle::stop`] is called.
    pub fn start(self: Arc<Self>) -> ReaperHandle {
        let (shutdown, _) = watch::channel(false);

        let locks = {
            let reaper = self.clone();
            spawn_loop("seat-lock", self.lock_interval, shutdown.subscribe(), move || {
                let reaper = reaper.clone();
                async move { reaper.sweep_seat_locks().await.map(|_| ()) }
            })
        };
        let bookings = {
            let reaper = self.clone();
            spawn_loop("booking", self.booking_interval, shutdown.subscribe(), move || {
                let reaper = reaper.clone();
                async move { reaper.sweep_bookings().await.map(|_| ()) }
            })
        };

        info!(
            "Expiry reaper started (locks every {:?}, bookings every {:?})",
            self.lock_interval, self.booking_interval
        );
        ReaperHandle {
            shutdown,
            tasks: vec![locks, bookings],
        }
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut sweep: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = CoreResult<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep().await {
                        error!("{} sweep failed: {}", name, e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("{} sweep stopped", name);
    })
}

/// Stops the sweep loops started by [`ExpiryReaper::start`].
pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Signals both loops and waits for the in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Reaper task ended abnormally: {}", e);
            }
        }
    }
}
