// libs/appointment-cell/src/services/slots.rs
//
// The slot calendar: the fixed working-day grid every availability and
// booking decision is phrased in. Pure functions only.
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::AppointmentError;

pub const SLOT_MINUTES: u32 = 30;

/// Working blocks of a consultation day: 08:00-14:00 and 15:00-17:00.
fn working_blocks() -> [(NaiveTime, NaiveTime); 2] {
    [
        (hm(8, 0), hm(14, 0)),
        (hm(15, 0), hm(17, 0)),
    ]
}

fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap()
}

/// The ordered candidate slots of any working day. Deterministic and
/// independent of bookings.
pub fn day_slots() -> Vec<NaiveTime> {
    let mut slots = Vec::new();
    for (start, end) in working_blocks() {
        let mut current = start;
        while current < end {
            slots.push(current);
            current += Duration::minutes(SLOT_MINUTES as i64);
        }
    }
    slots
}

pub fn day_slot_labels() -> Vec<String> {
    day_slots().iter().map(format_label).collect()
}

pub fn format_label(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Parse a UI slot label ("09:00") into a time of day.
pub fn parse_label(label: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(label, "%H:%M").ok()
}

/// Parse a stored time value; PostgREST returns "09:00:00" for `time`
/// columns but legacy rows may carry bare labels.
pub fn parse_stored(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Truncate a time of day to the slot grid, so off-grid rows still
/// count against the slot they overlap.
pub fn normalize(time: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    hm(time.hour(), time.minute() - time.minute() % SLOT_MINUTES)
}

/// Whether the time is exactly one of the day's bookable slots.
pub fn is_bookable(time: NaiveTime) -> bool {
    day_slots().contains(&time)
}

/// Shared date/time policy for booking and rescheduling: the slot must
/// be on the calendar and must not lie in the past relative to `now`.
pub fn validate_schedule(
    date: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> Result<(), AppointmentError> {
    if !is_bookable(time) {
        return Err(AppointmentError::ValidationError(
            "Selected time is not a bookable slot".to_string(),
        ));
    }

    if date < now.date() {
        return Err(AppointmentError::ValidationError(
            "Appointment date cannot be in the past".to_string(),
        ));
    }

    if date == now.date() && time <= now.time() {
        return Err(AppointmentError::ValidationError(
            "Selected time has already passed".to_string(),
        ));
    }

    Ok(())
}
