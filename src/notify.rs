use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Appointment, Span};

const CHANNEL_CAPACITY: usize = 256;

/// Per-tenant booking lifecycle events. Subscribers that fall behind
/// lose old events; this is a live feed, not a log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    Created {
        appointment_id: Ulid,
        professional_id: Ulid,
        span: Span,
    },
    Cancelled {
        appointment_id: Ulid,
        professional_id: Ulid,
    },
}

/// Outbound confirmation delivery. Implementations may talk to mail or
/// messaging providers; failures must stay inside the implementation's
/// error, never panic.
#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send_confirmation(
        &self,
        appointment: &Appointment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default sender: records the confirmation in the log and succeeds.
pub struct LogConfirmation;

#[async_trait]
impl ConfirmationSender for LogConfirmation {
    async fn send_confirmation(
        &self,
        appointment: &Appointment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            appointment = %appointment.id,
            tenant = %appointment.tenant_id,
            start = appointment.span.start,
            "booking confirmation sent"
        );
        Ok(())
    }
}

/// Fan-out point for booking events. One broadcast channel per tenant,
/// created lazily on first use.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<BookingEvent>>,
    confirmations: Arc<dyn ConfirmationSender>,
}

impl NotifyHub {
    pub fn new(confirmations: Arc<dyn ConfirmationSender>) -> Self {
        Self {
            channels: DashMap::new(),
            confirmations,
        }
    }

    pub fn subscribe(&self, tenant_id: Ulid) -> broadcast::Receiver<BookingEvent> {
        self.channels
            .entry(tenant_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Best effort: no subscribers, no delivery, no error.
    pub fn send(&self, tenant_id: Ulid, event: BookingEvent) {
        if let Some(tx) = self.channels.get(&tenant_id) {
            let _ = tx.send(event);
        }
    }

    /// Post-commit hook for a new booking: broadcast the event and spawn
    /// the confirmation. Neither can fail the already-committed booking.
    pub fn booking_created(&self, appointment: &Appointment) {
        self.send(
            appointment.tenant_id,
            BookingEvent::Created {
                appointment_id: appointment.id,
                professional_id: appointment.professional_id,
                span: appointment.span,
            },
        );
        let sender = self.confirmations.clone();
        let appointment = appointment.clone();
        tokio::spawn(async move {
            if let Err(err) = sender.send_confirmation(&appointment).await {
                tracing::warn!(
                    appointment = %appointment.id,
                    error = %err,
                    "booking confirmation failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppointmentStatus, Span};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_appointment(tenant_id: Ulid) -> Appointment {
        Appointment {
            id: Ulid::new(),
            tenant_id,
            professional_id: Ulid::new(),
            service_id: Ulid::new(),
            customer_id: Ulid::new(),
            span: Span::new(1_000, 2_000),
            status: AppointmentStatus::Pending,
            notes: None,
            cancelled_at: None,
            cancellation_reason: None,
            cancelled_by: None,
        }
    }

    struct CountingSender(AtomicUsize);

    #[async_trait]
    impl ConfirmationSender for CountingSender {
        async fn send_confirmation(
            &self,
            _appointment: &Appointment,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn subscribers_receive_tenant_events() {
        let hub = NotifyHub::new(Arc::new(LogConfirmation));
        let tenant = Ulid::new();
        let other = Ulid::new();
        let mut rx = hub.subscribe(tenant);
        let mut other_rx = hub.subscribe(other);

        let appointment = sample_appointment(tenant);
        hub.booking_created(&appointment);

        match rx.recv().await.unwrap() {
            BookingEvent::Created { appointment_id, .. } => {
                assert_eq!(appointment_id, appointment.id)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_a_no_op() {
        let hub = NotifyHub::new(Arc::new(LogConfirmation));
        hub.send(
            Ulid::new(),
            BookingEvent::Cancelled {
                appointment_id: Ulid::new(),
                professional_id: Ulid::new(),
            },
        );
    }

    #[tokio::test]
    async fn confirmation_runs_after_commit() {
        let counter = Arc::new(CountingSender(AtomicUsize::new(0)));
        let hub = NotifyHub::new(counter.clone());
        hub.booking_created(&sample_appointment(Ulid::new()));
        tokio::task::yield_now().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
