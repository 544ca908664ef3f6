use std::time::Instant;

use serde::Deserialize;
use tokio::time::timeout;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::BookingEvent;
use crate::{observability, tz};

use super::error::{ConflictKind, EngineError};
use super::Engine;

/// Everything needed to admit one booking. The customer is described
/// inline and upserted by email, so first-time callers do not have to
/// pre-register anybody.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub service_id: Ulid,
    pub professional_id: Ulid,
    /// RFC 3339 with offset, or a bare civil timestamp read in the
    /// tenant's zone.
    pub start_time: String,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

fn validate_request(request: &BookingRequest) -> Result<(), EngineError> {
    for (field, value) in [
        ("customer_first_name", &request.customer_first_name),
        ("customer_last_name", &request.customer_last_name),
    ] {
        if value.trim().is_empty() {
            return Err(EngineError::InvalidInput(format!("{field} is required")));
        }
        if value.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput(format!(
                "{field} exceeds {MAX_NAME_LEN} characters"
            )));
        }
    }
    let email = request.customer_email.trim();
    if email.is_empty() || !email.contains('@') || email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::InvalidInput(
            "customer_email is not a valid email address".into(),
        ));
    }
    if let Some(notes) = &request.notes {
        if notes.len() > MAX_NOTES_LEN {
            return Err(EngineError::InvalidInput(format!(
                "notes exceed {MAX_NOTES_LEN} characters"
            )));
        }
    }
    Ok(())
}

impl Engine {
    /// Admit one booking. The conflict checks and the insert run under
    /// the professional's calendar write lock, so two requests for the
    /// same slot serialize and exactly one wins. An attempt that cannot
    /// acquire the lock within the transaction timeout is retried once,
    /// then surfaced as `Unavailable`.
    pub async fn create_appointment(
        &self,
        tenant_id: Ulid,
        request: BookingRequest,
    ) -> Result<Appointment, EngineError> {
        let result = self.create_appointment_inner(tenant_id, request).await;
        metrics::counter!(
            observability::BOOKINGS_TOTAL,
            "outcome" => observability::booking_outcome(&result)
        )
        .increment(1);
        result
    }

    async fn create_appointment_inner(
        &self,
        tenant_id: Ulid,
        request: BookingRequest,
    ) -> Result<Appointment, EngineError> {
        validate_request(&request)?;

        let mut attempt = 0u32;
        let appointment = loop {
            attempt += 1;
            let started = Instant::now();
            match timeout(self.config.txn_timeout, self.admit(tenant_id, &request)).await {
                Ok(result) => {
                    metrics::histogram!(observability::BOOKING_TXN_SECONDS)
                        .record(started.elapsed().as_secs_f64());
                    break result?;
                }
                Err(_) if attempt < TXN_ATTEMPTS => {
                    metrics::counter!(observability::BOOKING_TXN_RETRIES_TOTAL).increment(1);
                    tracing::warn!(
                        tenant = %tenant_id,
                        professional = %request.professional_id,
                        "booking transaction timed out, retrying"
                    );
                }
                Err(_) => {
                    return Err(EngineError::Unavailable(
                        "booking transaction timed out".into(),
                    ));
                }
            }
        };

        // Post-commit. The booking stands regardless of what happens to
        // the confirmation.
        self.notify.booking_created(&appointment);
        Ok(appointment)
    }

    async fn admit(
        &self,
        tenant_id: Ulid,
        request: &BookingRequest,
    ) -> Result<Appointment, EngineError> {
        let service = self
            .store
            .find_service(tenant_id, request.service_id)
            .ok_or(EngineError::NotFound("service"))?;
        if self
            .store
            .find_professional(tenant_id, request.professional_id)
            .is_none()
        {
            return Err(EngineError::NotFound("professional"));
        }
        let tenant = self.tenant(tenant_id)?;

        let start = tz::parse_start_time(&request.start_time, tenant.tz())?;
        let span = Span::new(start, start + service.duration_min as Ms * 60_000);

        let calendar = self
            .store
            .calendar(request.professional_id)
            .ok_or(EngineError::NotFound("professional"))?;
        let mut guard = calendar.write().await;

        let customer = self.store.upsert_customer(
            tenant_id,
            &request.customer_email,
            &request.customer_first_name,
            &request.customer_last_name,
            request.customer_phone.as_deref(),
        );

        // Same customer resubmitting near the same start is a duplicate,
        // not a slot fight.
        let window = self.config.duplicate_window_ms;
        if guard.appointments.iter().any(|a| {
            a.is_active()
                && a.tenant_id == tenant_id
                && a.customer_id == customer.id
                && (a.span.start - start).abs() <= window
        }) {
            return Err(EngineError::Conflict(ConflictKind::DuplicateSubmission));
        }

        if guard
            .overlapping(&span)
            .any(|a| a.is_active() && a.tenant_id == tenant_id)
        {
            return Err(EngineError::Conflict(ConflictKind::SlotTaken));
        }

        let appointment = Appointment {
            id: Ulid::new(),
            tenant_id,
            professional_id: request.professional_id,
            service_id: service.id,
            customer_id: customer.id,
            span,
            status: request.status.unwrap_or(AppointmentStatus::Pending),
            notes: request.notes.clone(),
            cancelled_at: None,
            cancellation_reason: None,
            cancelled_by: None,
        };
        guard.insert(appointment.clone());
        self.store
            .index_appointment(appointment.id, request.professional_id);
        Ok(appointment)
    }

    /// Soft cancel: the row stays, flips to `CANCELLED` and stops
    /// counting against availability.
    pub async fn cancel_appointment(
        &self,
        tenant_id: Ulid,
        appointment_id: Ulid,
        request: CancelRequest,
    ) -> Result<Appointment, EngineError> {
        let professional_id = self
            .store
            .appointment_professional(appointment_id)
            .ok_or(EngineError::NotFound("appointment"))?;
        let calendar = self
            .store
            .calendar(professional_id)
            .ok_or(EngineError::NotFound("appointment"))?;
        let mut guard = calendar.write().await;

        let now = self.clock.now_ms();
        let Some(appointment) = guard.get_mut(appointment_id) else {
            return Err(EngineError::NotFound("appointment"));
        };
        if appointment.tenant_id != tenant_id {
            return Err(EngineError::NotFound("appointment"));
        }
        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancelled_at = Some(now);
        appointment.cancellation_reason = request.reason;
        appointment.cancelled_by = Some(request.cancelled_by.unwrap_or_else(|| "admin".into()));
        let updated = appointment.clone();
        drop(guard);

        self.notify.send(
            tenant_id,
            BookingEvent::Cancelled {
                appointment_id,
                professional_id,
            },
        );
        Ok(updated)
    }

    /// Hard delete. Unlike cancellation this leaves no trace.
    pub async fn remove_appointment(
        &self,
        tenant_id: Ulid,
        appointment_id: Ulid,
    ) -> Result<(), EngineError> {
        let professional_id = self
            .store
            .appointment_professional(appointment_id)
            .ok_or(EngineError::NotFound("appointment"))?;
        let calendar = self
            .store
            .calendar(professional_id)
            .ok_or(EngineError::NotFound("appointment"))?;
        let mut guard = calendar.write().await;

        match guard.get(appointment_id) {
            Some(a) if a.tenant_id == tenant_id => {}
            _ => return Err(EngineError::NotFound("appointment")),
        }
        guard.remove(appointment_id);
        drop(guard);
        self.store.unindex_appointment(appointment_id);
        Ok(())
    }

    pub async fn get_appointment(
        &self,
        tenant_id: Ulid,
        appointment_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        self.store
            .get_appointment(tenant_id, appointment_id)
            .await
            .ok_or(EngineError::NotFound("appointment"))
    }

    pub async fn list_appointments(
        &self,
        tenant_id: Ulid,
        filter: super::AppointmentFilter,
    ) -> Vec<Appointment> {
        self.store.list_appointments(tenant_id, filter).await
    }
}
