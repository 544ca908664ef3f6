use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::engine::{ConflictKind, EngineError};
use crate::model::Appointment;

pub const AVAILABILITY_QUERIES_TOTAL: &str = "slotd_availability_queries_total";
pub const AVAILABILITY_SLOTS: &str = "slotd_availability_slots";
pub const BOOKINGS_TOTAL: &str = "slotd_bookings_total";
pub const BOOKING_TXN_SECONDS: &str = "slotd_booking_txn_seconds";
pub const BOOKING_TXN_RETRIES_TOTAL: &str = "slotd_booking_txn_retries_total";
pub const TENANTS_ACTIVE: &str = "slotd_tenants_active";

/// Label value for the `outcome` dimension on `slotd_bookings_total`.
pub fn booking_outcome(result: &Result<Appointment, EngineError>) -> &'static str {
    match result {
        Ok(_) => "created",
        Err(EngineError::InvalidInput(_)) => "invalid_input",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::Conflict(ConflictKind::DuplicateSubmission)) => "duplicate",
        Err(EngineError::Conflict(ConflictKind::SlotTaken)) => "slot_taken",
        Err(EngineError::AlreadyExists(_)) => "already_exists",
        Err(EngineError::Unavailable(_)) => "unavailable",
    }
}

/// Install the Prometheus recorder and, when a port is given, its HTTP
/// scrape endpoint. Call once at startup; a second install fails.
pub fn init(metrics_port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let builder = PrometheusBuilder::new();
    match metrics_port {
        Some(port) => {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            builder.with_http_listener(addr).install()?;
            tracing::info!(%addr, "prometheus scrape endpoint listening");
        }
        None => {
            builder.install_recorder()?;
        }
    }
    metrics::describe_counter!(
        AVAILABILITY_QUERIES_TOTAL,
        "Availability queries served, including empty-rule days"
    );
    metrics::describe_histogram!(AVAILABILITY_SLOTS, "Slots returned per availability query");
    metrics::describe_counter!(BOOKINGS_TOTAL, "Booking attempts by outcome");
    metrics::describe_histogram!(
        BOOKING_TXN_SECONDS,
        "Wall time of one booking transaction attempt"
    );
    metrics::describe_counter!(
        BOOKING_TXN_RETRIES_TOTAL,
        "Booking transaction attempts retried after a timeout"
    );
    metrics::describe_gauge!(TENANTS_ACTIVE, "Registered tenants");
    Ok(())
}
