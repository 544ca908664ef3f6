use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only absolute time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// True interval intersection — touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// A wall-clock `HH:MM` in some tenant's zone. Ordering is chronological
/// within a day, which is what slot ordering needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CivilTime {
    pub hour: u8,
    pub minute: u8,
}

impl CivilTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Parse strict `HH:MM`.
    pub fn parse(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() != 5 || b[2] != b':' {
            return None;
        }
        if !b[0].is_ascii_digit()
            || !b[1].is_ascii_digit()
            || !b[3].is_ascii_digit()
            || !b[4].is_ascii_digit()
        {
            return None;
        }
        let hour = (b[0] - b'0') * 10 + (b[1] - b'0');
        let minute = (b[3] - b'0') * 10 + (b[4] - b'0');
        Self::new(hour, minute)
    }

    pub fn minutes_from_midnight(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }
}

impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for CivilTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CivilTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CivilTime::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("expected HH:MM, got {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Active appointments occupy the professional's calendar.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::NoShow)
    }
}

/// Who a schedule rule applies to. A rule is either tenant-global (all
/// professionals without their own rules for that day) or scoped to one
/// professional — never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleScope {
    Global { tenant_id: Ulid },
    Professional { professional_id: Ulid },
}

impl ScheduleScope {
    pub fn professional_id(&self) -> Option<Ulid> {
        match self {
            Self::Professional { professional_id } => Some(*professional_id),
            Self::Global { .. } => None,
        }
    }
}

/// One weekly working-hours window. `day_of_week` is 0=Sunday..6=Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: Ulid,
    pub scope: ScheduleScope,
    pub day_of_week: u8,
    pub start: CivilTime,
    pub end: CivilTime,
    pub is_exception: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub tenant_id: Ulid,
    pub name: String,
    /// Slot length and appointment length, in minutes. Always > 0.
    pub duration_min: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professional {
    pub id: Ulid,
    pub tenant_id: Ulid,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Ulid,
    pub tenant_id: Ulid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Ulid,
    pub slug: String,
    pub name: String,
    /// IANA zone. Civil-time math falls back to UTC when unset.
    pub timezone: Option<chrono_tz::Tz>,
}

impl Tenant {
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.unwrap_or(chrono_tz::Tz::UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub tenant_id: Ulid,
    pub professional_id: Ulid,
    pub service_id: Ulid,
    pub customer_id: Ulid,
    #[serde(flatten)]
    pub span: Span,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancelled_at: Option<Ms>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// One entry in an availability response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: CivilTime,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn civil_time_parse() {
        assert_eq!(CivilTime::parse("09:00"), CivilTime::new(9, 0));
        assert_eq!(CivilTime::parse("23:59"), CivilTime::new(23, 59));
        assert_eq!(CivilTime::parse("24:00"), None);
        assert_eq!(CivilTime::parse("09:60"), None);
        assert_eq!(CivilTime::parse("9:00"), None);
        assert_eq!(CivilTime::parse("09-00"), None);
        assert_eq!(CivilTime::parse("0900"), None);
    }

    #[test]
    fn civil_time_order_and_display() {
        let a = CivilTime::new(9, 30).unwrap();
        let b = CivilTime::new(10, 0).unwrap();
        assert!(a < b);
        assert_eq!(a.to_string(), "09:30");
        assert_eq!(a.minutes_from_midnight(), 570);
    }

    #[test]
    fn civil_time_serde_as_string() {
        let t = CivilTime::new(14, 5).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"14:05\"");
        let back: CivilTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn status_activity() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::NoShow.is_active());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AppointmentStatus::NoShow).unwrap(),
            "\"NO_SHOW\""
        );
        assert_eq!(
            serde_json::from_str::<AppointmentStatus>("\"CANCELLED\"").unwrap(),
            AppointmentStatus::Cancelled
        );
    }

    #[test]
    fn tenant_zone_defaults_to_utc() {
        let t = Tenant {
            id: Ulid::new(),
            slug: "t".into(),
            name: "T".into(),
            timezone: None,
        };
        assert_eq!(t.tz(), chrono_tz::Tz::UTC);
    }

    #[test]
    fn scope_professional_id() {
        let pid = Ulid::new();
        let scoped = ScheduleScope::Professional { professional_id: pid };
        let global = ScheduleScope::Global { tenant_id: Ulid::new() };
        assert_eq!(scoped.professional_id(), Some(pid));
        assert_eq!(global.professional_id(), None);
    }
}
