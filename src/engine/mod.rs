mod admission;
mod availability;
mod error;
mod store;

pub use admission::{BookingRequest, CancelRequest};
pub use availability::{dedup_slots, generate_slots};
pub use error::{ConflictKind, EngineError};
pub use store::{AppointmentFilter, Calendar, SharedCalendar, Store};

use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;

use crate::clock::Clock;
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::tenant::TenantDirectory;
use crate::{observability, tz};

pub struct EngineConfig {
    /// Bound on one booking transaction attempt.
    pub txn_timeout: Duration,
    /// ± window for the duplicate-submission check.
    pub duplicate_window_ms: Ms,
    /// Slot length when no service is supplied.
    pub default_duration_min: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            txn_timeout: Duration::from_millis(DEFAULT_TXN_TIMEOUT_MS),
            duplicate_window_ms: DUPLICATE_WINDOW_MS,
            default_duration_min: DEFAULT_SERVICE_DURATION_MIN,
        }
    }
}

/// The availability & booking conflict engine. Owns the store and the
/// tenant directory; "now" comes from the injected clock so tests can
/// pin it.
pub struct Engine {
    pub store: Store,
    pub tenants: TenantDirectory,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
}

impl Engine {
    pub fn new(clock: Arc<dyn Clock>, notify: Arc<NotifyHub>, config: EngineConfig) -> Self {
        Self {
            store: Store::new(),
            tenants: TenantDirectory::new(),
            notify,
            clock,
            config,
        }
    }

    pub(super) fn tenant(&self, tenant_id: Ulid) -> Result<Tenant, EngineError> {
        self.tenants
            .get(tenant_id)
            .ok_or(EngineError::NotFound("tenant"))
    }

    /// Bookable slots for `(tenant, professional, service?, date)`.
    ///
    /// Read-only: a consistent snapshot of the day's appointments is
    /// enough, because every slot shown here is re-validated by the
    /// admission controller at booking time. A day with no configured
    /// rules is an empty success, not an error.
    pub async fn get_availability(
        &self,
        tenant_id: Ulid,
        professional_id: Ulid,
        service_id: Option<Ulid>,
        date: &str,
    ) -> Result<Vec<Slot>, EngineError> {
        // Date shape is checked before touching any store state.
        let date = tz::parse_civil_date(date)?;

        let tenant = self.tenant(tenant_id)?;
        if self
            .store
            .find_professional(tenant_id, professional_id)
            .is_none()
        {
            return Err(EngineError::NotFound("professional"));
        }

        let zone = tenant.tz();
        let day_of_week = tz::day_of_week(date);
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);

        let rules = self
            .store
            .find_schedule_rules(tenant_id, professional_id, day_of_week);
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        // Unknown or omitted service falls back to the default length.
        let duration_min = service_id
            .and_then(|id| self.store.find_service(tenant_id, id))
            .map(|s| s.duration_min)
            .unwrap_or(self.config.default_duration_min);

        let window = tz::day_bounds(zone, date)?;
        let appointments = self
            .store
            .find_active_appointments(tenant_id, professional_id, window)
            .await;

        let slots = generate_slots(
            &rules,
            &appointments,
            zone,
            date,
            duration_min,
            self.clock.now_ms(),
        )?;
        metrics::histogram!(observability::AVAILABILITY_SLOTS).record(slots.len() as f64);
        Ok(slots)
    }
}
