use std::collections::BTreeMap;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::limits::MIN_SLOT_STEP_MIN;
use crate::model::*;
use crate::tz;

use super::EngineError;

// ── Slot Generation Algorithm ─────────────────────────────────────

/// Produce the bookable slots for one civil day.
///
/// Pure over its inputs: the selected schedule rules, the day's active
/// appointments, the tenant zone, and an explicit "now". For each rule
/// a cursor walks from the rule's start in steps of
/// `max(duration, MIN_SLOT_STEP)` minutes; each step emits a candidate
/// `[cursor, cursor + duration)` until the candidate no longer fits
/// before the rule's end.
///
/// A slot is unavailable when its interval truly intersects an
/// appointment (touching endpoints are fine) or when its start lies
/// before `now`. The past check compares absolute instants — never
/// zone-shifted values — so DST transitions cannot resurrect past slots.
pub fn generate_slots(
    rules: &[ScheduleRule],
    appointments: &[Appointment],
    tz: Tz,
    date: NaiveDate,
    duration_min: u32,
    now: Ms,
) -> Result<Vec<Slot>, EngineError> {
    let duration_ms = duration_min as Ms * 60_000;
    let step_ms = duration_min.max(MIN_SLOT_STEP_MIN) as Ms * 60_000;

    let mut raw: Vec<Slot> = Vec::new();
    for rule in rules {
        let schedule_start = tz::civil_time_on_date(tz, date, rule.start)?;
        let schedule_end = tz::civil_time_on_date(tz, date, rule.end)?;

        let mut cursor = schedule_start;
        while cursor + duration_ms <= schedule_end {
            let slot_span = Span::new(cursor, cursor + duration_ms);
            let conflict = appointments.iter().any(|a| a.span.overlaps(&slot_span));
            let past = cursor < now;
            raw.push(Slot {
                time: tz::civil_hm(tz, cursor),
                available: !conflict && !past,
            });
            cursor += step_ms;
        }
    }

    Ok(dedup_slots(raw))
}

/// Collapse duplicate `HH:MM` entries (rules with abutting or
/// overlapping windows can emit the same wall-clock time), keeping a
/// slot available if any duplicate was. The map keeps the result
/// ordered by civil time ascending.
pub fn dedup_slots(raw: Vec<Slot>) -> Vec<Slot> {
    let mut merged: BTreeMap<CivilTime, bool> = BTreeMap::new();
    for slot in raw {
        merged
            .entry(slot.time)
            .and_modify(|available| *available |= slot.available)
            .or_insert(slot.available);
    }
    merged
        .into_iter()
        .map(|(time, available)| Slot { time, available })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;
    use ulid::Ulid;

    const M: Ms = 60_000;
    const BA: Tz = chrono_tz::America::Argentina::Buenos_Aires;

    fn monday() -> NaiveDate {
        tz::parse_civil_date("2024-06-03").unwrap()
    }

    fn rule(scope: ScheduleScope, dow: u8, start: &str, end: &str) -> ScheduleRule {
        ScheduleRule {
            id: Ulid::new(),
            scope,
            day_of_week: dow,
            start: CivilTime::parse(start).unwrap(),
            end: CivilTime::parse(end).unwrap(),
            is_exception: false,
        }
    }

    fn pro_rule(start: &str, end: &str) -> ScheduleRule {
        rule(
            ScheduleScope::Professional {
                professional_id: Ulid::new(),
            },
            1,
            start,
            end,
        )
    }

    fn booking(start: Ms, end: Ms) -> Appointment {
        Appointment {
            id: Ulid::new(),
            tenant_id: Ulid::new(),
            professional_id: Ulid::new(),
            service_id: Ulid::new(),
            customer_id: Ulid::new(),
            span: Span::new(start, end),
            status: AppointmentStatus::Pending,
            notes: None,
            cancelled_at: None,
            cancellation_reason: None,
            cancelled_by: None,
        }
    }

    fn local(hhmm: &str) -> Ms {
        tz::civil_time_on_date(BA, monday(), CivilTime::parse(hhmm).unwrap()).unwrap()
    }

    fn times(slots: &[Slot]) -> Vec<String> {
        slots.iter().map(|s| s.time.to_string()).collect()
    }

    #[test]
    fn morning_window_thirty_minute_grid() {
        // Mon 09:00–12:00, duration 30, now before opening → 6 slots.
        let slots = generate_slots(
            &[pro_rule("09:00", "12:00")],
            &[],
            BA,
            monday(),
            30,
            local("08:00"),
        )
        .unwrap();
        assert_eq!(
            times(&slots),
            vec!["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"]
        );
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn booked_slot_goes_unavailable_others_untouched() {
        let slots = generate_slots(
            &[pro_rule("09:00", "12:00")],
            &[booking(local("10:00"), local("10:30"))],
            BA,
            monday(),
            30,
            local("08:00"),
        )
        .unwrap();
        for s in &slots {
            let expect = s.time != CivilTime::parse("10:00").unwrap();
            assert_eq!(s.available, expect, "slot {}", s.time);
        }
    }

    #[test]
    fn touching_appointment_does_not_conflict() {
        // Appointment ends exactly at 10:00 — the 10:00 slot stays free.
        let slots = generate_slots(
            &[pro_rule("09:00", "12:00")],
            &[booking(local("09:30"), local("10:00"))],
            BA,
            monday(),
            30,
            local("08:00"),
        )
        .unwrap();
        let ten = slots
            .iter()
            .find(|s| s.time == CivilTime::parse("10:00").unwrap())
            .unwrap();
        assert!(ten.available);
        let nine_thirty = slots
            .iter()
            .find(|s| s.time == CivilTime::parse("09:30").unwrap())
            .unwrap();
        assert!(!nine_thirty.available);
    }

    #[test]
    fn past_slots_marked_unavailable() {
        let slots = generate_slots(
            &[pro_rule("09:00", "12:00")],
            &[],
            BA,
            monday(),
            30,
            local("10:15"),
        )
        .unwrap();
        for s in &slots {
            let past = s.time <= CivilTime::parse("10:00").unwrap();
            assert_eq!(s.available, !past, "slot {}", s.time);
        }
    }

    #[test]
    fn last_partial_slot_not_emitted() {
        // 09:00–10:45 with 30-minute slots: 10:30 would end at 11:00 > 10:45.
        let slots = generate_slots(
            &[pro_rule("09:00", "10:45")],
            &[],
            BA,
            monday(),
            30,
            0,
        )
        .unwrap();
        assert_eq!(times(&slots), vec!["09:00", "09:30", "10:00"]);
    }

    #[test]
    fn short_service_still_steps_thirty_minutes() {
        // Duration 15 → candidates are 15 minutes long but the cursor
        // still advances by the 30-minute floor.
        let slots = generate_slots(
            &[pro_rule("09:00", "10:00")],
            &[],
            BA,
            monday(),
            15,
            0,
        )
        .unwrap();
        assert_eq!(times(&slots), vec!["09:00", "09:30"]);
    }

    #[test]
    fn long_service_steps_by_duration() {
        let slots = generate_slots(
            &[pro_rule("09:00", "12:00")],
            &[],
            BA,
            monday(),
            60,
            0,
        )
        .unwrap();
        assert_eq!(times(&slots), vec!["09:00", "10:00", "11:00"]);
    }

    #[test]
    fn long_service_conflicts_with_mid_interval_booking() {
        // 60-minute slot 09:00–10:00 intersects a 09:30–10:00 booking.
        let slots = generate_slots(
            &[pro_rule("09:00", "11:00")],
            &[booking(local("09:30"), local("10:00"))],
            BA,
            monday(),
            60,
            0,
        )
        .unwrap();
        assert_eq!(times(&slots), vec!["09:00", "10:00"]);
        assert!(!slots[0].available);
        assert!(slots[1].available);
    }

    #[test]
    fn two_windows_emit_in_chronological_order() {
        let slots = generate_slots(
            &[pro_rule("14:00", "16:00"), pro_rule("09:00", "11:00")],
            &[],
            BA,
            monday(),
            60,
            0,
        )
        .unwrap();
        assert_eq!(times(&slots), vec!["09:00", "10:00", "14:00", "15:00"]);
    }

    #[test]
    fn duplicate_times_dedup_available_wins() {
        let raw = vec![
            Slot {
                time: CivilTime::parse("09:00").unwrap(),
                available: false,
            },
            Slot {
                time: CivilTime::parse("09:00").unwrap(),
                available: true,
            },
            Slot {
                time: CivilTime::parse("08:00").unwrap(),
                available: false,
            },
        ];
        let merged = dedup_slots(raw);
        assert_eq!(times(&merged), vec!["08:00", "09:00"]);
        assert!(!merged[0].available);
        assert!(merged[1].available);
    }

    #[test]
    fn overlapping_rule_windows_dedup() {
        // 09:00–11:00 and 10:00–12:00 both emit 10:00 and 10:30.
        let slots = generate_slots(
            &[pro_rule("09:00", "11:00"), pro_rule("10:00", "12:00")],
            &[],
            BA,
            monday(),
            30,
            0,
        )
        .unwrap();
        assert_eq!(
            times(&slots),
            vec!["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"]
        );
    }

    #[test]
    fn no_rules_no_slots() {
        let slots = generate_slots(&[], &[], BA, monday(), 30, 0).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn window_shorter_than_duration_emits_nothing() {
        let slots = generate_slots(&[pro_rule("09:00", "09:20")], &[], BA, monday(), 30, 0).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn generation_is_idempotent_for_fixed_now() {
        let rules = [pro_rule("09:00", "12:00")];
        let appts = [booking(local("10:00"), local("10:30"))];
        let now = local("09:45");
        let a = generate_slots(&rules, &appts, BA, monday(), 30, now).unwrap();
        let b = generate_slots(&rules, &appts, BA, monday(), 30, now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn slot_instants_use_tenant_zone_not_utc() {
        // 09:00 Buenos Aires is 12:00 UTC; an appointment at 12:00 UTC
        // must block the 09:00 local slot.
        let noon_utc = local("09:00"); // same instant by construction
        let slots = generate_slots(
            &[pro_rule("09:00", "10:00")],
            &[booking(noon_utc, noon_utc + 30 * M)],
            BA,
            monday(),
            30,
            0,
        )
        .unwrap();
        assert!(!slots[0].available);
        assert_eq!(slots[0].time.to_string(), "09:00");
    }
}
