//! slotd: a multi-tenant availability and booking conflict engine.
//!
//! Tenants configure weekly schedule rules for their professionals;
//! clients query bookable slots for a civil day in the tenant's time
//! zone and submit bookings that are admitted under a per-professional
//! calendar lock, so double-booking is impossible by construction.

pub mod clock;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod tenant;
pub mod tz;
pub mod wire;
