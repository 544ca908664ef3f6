use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedCalendar = Arc<RwLock<Calendar>>;

/// One professional's appointment list, sorted by `span.start`. The
/// enclosing `RwLock` is the transaction boundary: whoever holds the
/// write guard sees and mutates the calendar atomically.
#[derive(Debug, Clone)]
pub struct Calendar {
    pub professional_id: Ulid,
    pub appointments: Vec<Appointment>,
}

impl Calendar {
    pub fn new(professional_id: Ulid) -> Self {
        Self {
            professional_id,
            appointments: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start instant.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Appointments whose span overlaps the query window. Binary search
    /// skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }
}

/// Filters for appointment listings (admin views).
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentFilter {
    pub professional_id: Option<Ulid>,
    pub status: Option<AppointmentStatus>,
    pub range: Option<Span>,
}

/// The transactional store behind the engine: tenant catalog data plus
/// per-professional calendars. Catalog maps are lock-free; calendars are
/// the only contended resource and carry their own `RwLock`.
pub struct Store {
    services: DashMap<Ulid, Service>,
    professionals: DashMap<Ulid, Professional>,
    customers: DashMap<Ulid, Customer>,
    customer_by_email: DashMap<(Ulid, String), Ulid>,
    rules: DashMap<Ulid, ScheduleRule>,
    calendars: DashMap<Ulid, SharedCalendar>,
    /// Reverse lookup: appointment id → professional id.
    appointment_index: DashMap<Ulid, Ulid>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            professionals: DashMap::new(),
            customers: DashMap::new(),
            customer_by_email: DashMap::new(),
            rules: DashMap::new(),
            calendars: DashMap::new(),
            appointment_index: DashMap::new(),
        }
    }

    // ── Catalog ──────────────────────────────────────────────

    pub fn insert_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn find_service(&self, tenant_id: Ulid, id: Ulid) -> Option<Service> {
        self.services
            .get(&id)
            .filter(|s| s.tenant_id == tenant_id)
            .map(|s| s.value().clone())
    }

    pub fn insert_professional(&self, professional: Professional) {
        self.calendars.insert(
            professional.id,
            Arc::new(RwLock::new(Calendar::new(professional.id))),
        );
        self.professionals.insert(professional.id, professional);
    }

    pub fn find_professional(&self, tenant_id: Ulid, id: Ulid) -> Option<Professional> {
        self.professionals
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .map(|p| p.value().clone())
    }

    fn professional_tenant(&self, id: Ulid) -> Option<Ulid> {
        self.professionals.get(&id).map(|p| p.tenant_id)
    }

    // ── Schedule rules ───────────────────────────────────────

    pub fn add_rule(&self, rule: ScheduleRule) {
        self.rules.insert(rule.id, rule);
    }

    pub fn remove_rule(&self, id: Ulid) -> Option<ScheduleRule> {
        self.rules.remove(&id).map(|(_, r)| r)
    }

    /// Weekly non-exception rules applicable to a professional on a day.
    /// Professional-scoped rules, if any exist, fully supersede the
    /// tenant's global rules — never merged.
    pub fn find_schedule_rules(
        &self,
        tenant_id: Ulid,
        professional_id: Ulid,
        day_of_week: u8,
    ) -> Vec<ScheduleRule> {
        let mut scoped: Vec<ScheduleRule> = self
            .rules
            .iter()
            .filter(|r| {
                !r.is_exception
                    && r.day_of_week == day_of_week
                    && r.scope.professional_id() == Some(professional_id)
            })
            .map(|r| *r.value())
            .collect();
        if scoped.is_empty() {
            scoped = self
                .rules
                .iter()
                .filter(|r| {
                    !r.is_exception
                        && r.day_of_week == day_of_week
                        && matches!(r.scope, ScheduleScope::Global { tenant_id: t } if t == tenant_id)
                })
                .map(|r| *r.value())
                .collect();
        }
        scoped.sort_by_key(|r| r.start);
        scoped
    }

    /// All rules visible to a tenant: its global rules plus rules of its
    /// professionals.
    pub fn rules_for_tenant(&self, tenant_id: Ulid) -> Vec<ScheduleRule> {
        let mut out: Vec<ScheduleRule> = self
            .rules
            .iter()
            .filter(|r| match r.scope {
                ScheduleScope::Global { tenant_id: t } => t == tenant_id,
                ScheduleScope::Professional { professional_id } => {
                    self.professional_tenant(professional_id) == Some(tenant_id)
                }
            })
            .map(|r| *r.value())
            .collect();
        out.sort_by_key(|r| (r.day_of_week, r.start));
        out
    }

    // ── Customers ────────────────────────────────────────────

    /// Idempotent identity by `(tenant, email)`: create if absent,
    /// otherwise reuse the existing record untouched.
    pub fn upsert_customer(
        &self,
        tenant_id: Ulid,
        email: &str,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> Customer {
        let id = *self
            .customer_by_email
            .entry((tenant_id, email.to_string()))
            .or_insert_with(|| {
                let customer = Customer {
                    id: Ulid::new(),
                    tenant_id,
                    email: email.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    phone: phone.map(str::to_string),
                };
                let id = customer.id;
                self.customers.insert(id, customer);
                id
            });
        match self.customers.get(&id) {
            Some(c) => c.value().clone(),
            // Customers are never deleted, so the index cannot dangle;
            // rebuild a record rather than panic if it ever does.
            None => {
                let customer = Customer {
                    id,
                    tenant_id,
                    email: email.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    phone: phone.map(str::to_string),
                };
                self.customers.insert(id, customer.clone());
                customer
            }
        }
    }

    pub fn find_customer(&self, tenant_id: Ulid, id: Ulid) -> Option<Customer> {
        self.customers
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| c.value().clone())
    }

    // ── Calendars / appointments ─────────────────────────────

    pub fn calendar(&self, professional_id: Ulid) -> Option<SharedCalendar> {
        self.calendars.get(&professional_id).map(|e| e.value().clone())
    }

    pub fn index_appointment(&self, appointment_id: Ulid, professional_id: Ulid) {
        self.appointment_index.insert(appointment_id, professional_id);
    }

    pub fn unindex_appointment(&self, appointment_id: Ulid) {
        self.appointment_index.remove(&appointment_id);
    }

    pub fn appointment_professional(&self, appointment_id: Ulid) -> Option<Ulid> {
        self.appointment_index
            .get(&appointment_id)
            .map(|e| *e.value())
    }

    /// Active (non-cancelled, non-no-show) appointments for a
    /// professional whose start instant falls within `[window.start,
    /// window.end]`, ordered by start ascending.
    pub async fn find_active_appointments(
        &self,
        tenant_id: Ulid,
        professional_id: Ulid,
        window: Span,
    ) -> Vec<Appointment> {
        let Some(calendar) = self.calendar(professional_id) else {
            return Vec::new();
        };
        let guard = calendar.read().await;
        guard
            .appointments
            .iter()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && a.is_active()
                    && a.span.start >= window.start
                    && a.span.start <= window.end
            })
            .cloned()
            .collect()
    }

    pub async fn get_appointment(&self, tenant_id: Ulid, id: Ulid) -> Option<Appointment> {
        let professional_id = self.appointment_professional(id)?;
        let calendar = self.calendar(professional_id)?;
        let guard = calendar.read().await;
        guard
            .get(id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
    }

    pub async fn list_appointments(
        &self,
        tenant_id: Ulid,
        filter: AppointmentFilter,
    ) -> Vec<Appointment> {
        let professionals: Vec<Ulid> = match filter.professional_id {
            Some(pid) => vec![pid],
            None => self
                .professionals
                .iter()
                .filter(|p| p.tenant_id == tenant_id)
                .map(|p| p.id)
                .collect(),
        };
        let mut out = Vec::new();
        for pid in professionals {
            let Some(calendar) = self.calendar(pid) else {
                continue;
            };
            let guard = calendar.read().await;
            out.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| a.tenant_id == tenant_id)
                    .filter(|a| filter.status.is_none_or(|s| a.status == s))
                    .filter(|a| {
                        filter
                            .range
                            .is_none_or(|r| a.span.start >= r.start && a.span.start <= r.end)
                    })
                    .cloned(),
            );
        }
        out.sort_by_key(|a| a.span.start);
        out
    }
}
