use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::engine::{
    AppointmentFilter, BookingRequest, CancelRequest, ConflictKind, Engine, EngineError,
};
use crate::limits::MAX_NAME_LEN;
use crate::model::*;
use crate::tz;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Engine(err) = self;
        let (status, kind) = match &err {
            EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Conflict(ConflictKind::DuplicateSubmission) => {
                (StatusCode::CONFLICT, "duplicate_submission")
            }
            EngineError::Conflict(ConflictKind::SlotTaken) => {
                (StatusCode::CONFLICT, "slot_taken")
            }
            EngineError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            EngineError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        };
        let body = ErrorBody {
            error: kind,
            message: err.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/tenants", post(create_tenant))
        .route("/v1/tenants/{slug}/services", post(create_service))
        .route("/v1/tenants/{slug}/professionals", post(create_professional))
        .route(
            "/v1/tenants/{slug}/schedules",
            get(list_schedules).post(create_schedule),
        )
        .route("/v1/tenants/{slug}/schedules/{id}", delete(delete_schedule))
        .route("/v1/tenants/{slug}/availability", get(availability))
        .route(
            "/v1/tenants/{slug}/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route(
            "/v1/tenants/{slug}/appointments/{id}",
            get(get_appointment).delete(remove_appointment),
        )
        .route(
            "/v1/tenants/{slug}/appointments/{id}/cancel",
            post(cancel_appointment),
        )
        .with_state(engine)
}

fn tenant_by_slug(engine: &Engine, slug: &str) -> Result<Tenant, ApiError> {
    engine
        .tenants
        .get_by_slug(slug)
        .ok_or(ApiError::Engine(EngineError::NotFound("tenant")))
}

async fn health() -> &'static str {
    "ok"
}

// ── Tenant / catalog ─────────────────────────────────────────

#[derive(Deserialize)]
struct CreateTenantRequest {
    slug: String,
    name: String,
    #[serde(default)]
    timezone: Option<String>,
}

async fn create_tenant(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>), ApiError> {
    let tenant = engine
        .tenants
        .create(&req.slug, &req.name, req.timezone.as_deref())?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[derive(Deserialize)]
struct CreateServiceRequest {
    name: String,
    duration_min: u32,
}

async fn create_service(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
    Json(req): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    if req.name.trim().is_empty() || req.name.len() > MAX_NAME_LEN {
        return Err(EngineError::InvalidInput(format!(
            "service name must be 1..={MAX_NAME_LEN} characters"
        ))
        .into());
    }
    if req.duration_min == 0 {
        return Err(EngineError::InvalidInput("duration_min must be positive".into()).into());
    }
    let service = Service {
        id: Ulid::new(),
        tenant_id: tenant.id,
        name: req.name,
        duration_min: req.duration_min,
    };
    engine.store.insert_service(service.clone());
    Ok((StatusCode::CREATED, Json(service)))
}

#[derive(Deserialize)]
struct CreateProfessionalRequest {
    first_name: String,
    last_name: String,
}

async fn create_professional(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
    Json(req): Json<CreateProfessionalRequest>,
) -> Result<(StatusCode, Json<Professional>), ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    for (field, value) in [("first_name", &req.first_name), ("last_name", &req.last_name)] {
        if value.trim().is_empty() || value.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput(format!(
                "{field} must be 1..={MAX_NAME_LEN} characters"
            ))
            .into());
        }
    }
    let professional = Professional {
        id: Ulid::new(),
        tenant_id: tenant.id,
        first_name: req.first_name,
        last_name: req.last_name,
    };
    engine.store.insert_professional(professional.clone());
    Ok((StatusCode::CREATED, Json(professional)))
}

// ── Schedule rules ───────────────────────────────────────────

#[derive(Deserialize)]
struct CreateScheduleRequest {
    /// Absent means a tenant-wide rule.
    #[serde(default)]
    professional_id: Option<Ulid>,
    day_of_week: u8,
    start: String,
    end: String,
    #[serde(default)]
    is_exception: bool,
}

async fn create_schedule(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleRule>), ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    if req.day_of_week > 6 {
        return Err(
            EngineError::InvalidInput("day_of_week must be 0 (Sunday) through 6".into()).into(),
        );
    }
    let start = CivilTime::parse(&req.start)
        .ok_or_else(|| EngineError::InvalidInput(format!("expected HH:MM, got {:?}", req.start)))?;
    let end = CivilTime::parse(&req.end)
        .ok_or_else(|| EngineError::InvalidInput(format!("expected HH:MM, got {:?}", req.end)))?;
    if start >= end {
        return Err(EngineError::InvalidInput("start must precede end".into()).into());
    }
    let scope = match req.professional_id {
        Some(professional_id) => {
            if engine
                .store
                .find_professional(tenant.id, professional_id)
                .is_none()
            {
                return Err(EngineError::NotFound("professional").into());
            }
            ScheduleScope::Professional { professional_id }
        }
        None => ScheduleScope::Global {
            tenant_id: tenant.id,
        },
    };
    let rule = ScheduleRule {
        id: Ulid::new(),
        scope,
        day_of_week: req.day_of_week,
        start,
        end,
        is_exception: req.is_exception,
    };
    engine.store.add_rule(rule);
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_schedules(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<ScheduleRule>>, ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    Ok(Json(engine.store.rules_for_tenant(tenant.id)))
}

async fn delete_schedule(
    State(engine): State<Arc<Engine>>,
    Path((slug, id)): Path<(String, Ulid)>,
) -> Result<StatusCode, ApiError> {
    tenant_by_slug(&engine, &slug)?;
    match engine.store.remove_rule(id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(EngineError::NotFound("schedule rule").into()),
    }
}

// ── Availability / bookings ──────────────────────────────────

#[derive(Deserialize)]
struct AvailabilityQuery {
    professional_id: Ulid,
    date: String,
    #[serde(default)]
    service_id: Option<Ulid>,
}

async fn availability(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    let slots = engine
        .get_availability(tenant.id, query.professional_id, query.service_id, &query.date)
        .await?;
    Ok(Json(slots))
}

async fn create_appointment(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    let appointment = engine.create_appointment(tenant.id, req).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    professional_id: Option<Ulid>,
    #[serde(default)]
    status: Option<AppointmentStatus>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    /// Single-day shortcut, equivalent to `from=date&to=date`.
    #[serde(default)]
    date: Option<String>,
}

async fn list_appointments(
    State(engine): State<Arc<Engine>>,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    if query.date.is_some() && (query.from.is_some() || query.to.is_some()) {
        return Err(
            EngineError::InvalidInput("date cannot be combined with from/to".into()).into(),
        );
    }
    let (from, to) = match &query.date {
        Some(date) => (Some(date.clone()), Some(date.clone())),
        None => (query.from.clone(), query.to.clone()),
    };
    let range = match (&from, &to) {
        (Some(from), Some(to)) => {
            let zone = tenant.tz();
            let from = tz::day_bounds(zone, tz::parse_civil_date(from)?)?;
            let to = tz::day_bounds(zone, tz::parse_civil_date(to)?)?;
            if from.start > to.end {
                return Err(EngineError::InvalidInput("from is after to".into()).into());
            }
            Some(Span::new(from.start, to.end))
        }
        (None, None) => None,
        _ => {
            return Err(
                EngineError::InvalidInput("from and to must be supplied together".into()).into(),
            )
        }
    };
    let filter = AppointmentFilter {
        professional_id: query.professional_id,
        status: query.status,
        range,
    };
    Ok(Json(engine.list_appointments(tenant.id, filter).await))
}

async fn get_appointment(
    State(engine): State<Arc<Engine>>,
    Path((slug, id)): Path<(String, Ulid)>,
) -> Result<Json<Appointment>, ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    Ok(Json(engine.get_appointment(tenant.id, id).await?))
}

async fn cancel_appointment(
    State(engine): State<Arc<Engine>>,
    Path((slug, id)): Path<(String, Ulid)>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Appointment>, ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(engine.cancel_appointment(tenant.id, id, request).await?))
}

async fn remove_appointment(
    State(engine): State<Arc<Engine>>,
    Path((slug, id)): Path<(String, Ulid)>,
) -> Result<StatusCode, ApiError> {
    let tenant = tenant_by_slug(&engine, &slug)?;
    engine.remove_appointment(tenant.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
