// libs/appointment-cell/src/services/availability.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;
use crate::services::slots;

/// Answers "which slots are already taken" for one specialist-day.
///
/// The booking funnel calls this twice: a soft check to render the time
/// step, and a hard check immediately before the insert to close the
/// time-of-check/time-of-use gap. The storage-level unique index remains
/// the authoritative guard; this service only narrows the race window.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Times of all appointments for the specialist on the date whose
    /// status still blocks the slot (anything but cancelled/rejected),
    /// normalized to the slot grid. `exclude_appointment_id` removes the
    /// appointment being rescheduled from its own conflict check.
    pub async fn taken_slots(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<HashSet<NaiveTime>, AppointmentError> {
        debug!("Fetching taken slots for specialist {} on {}", specialist_id, date);

        let mut query_parts = vec![
            format!("specialist_id=eq.{}", specialist_id),
            format!("date=eq.{}", date),
            "status=not.in.(cancelled,rejected)".to_string(),
            "select=id,time,status".to_string(),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let mut taken = HashSet::new();
        for row in &result {
            match row["time"].as_str().and_then(slots::parse_stored) {
                Some(time) => {
                    taken.insert(slots::normalize(time));
                }
                None => {
                    warn!("Skipping appointment row with unparseable time: {}", row["id"]);
                }
            }
        }

        Ok(taken)
    }

    /// Free slots = the day grid minus the taken set, in calendar order.
    pub async fn free_slots(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<NaiveTime>, AppointmentError> {
        let taken = self
            .taken_slots(specialist_id, date, None, auth_token)
            .await?;

        Ok(slots::day_slots()
            .into_iter()
            .filter(|slot| !taken.contains(slot))
            .collect())
    }

    /// The hard check: fails with a conflict if the chosen slot is taken
    /// at this instant. Run immediately before the insert or the
    /// reschedule patch.
    pub async fn ensure_slot_free(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let taken = self
            .taken_slots(specialist_id, date, exclude_appointment_id, auth_token)
            .await?;

        if taken.contains(&slots::normalize(time)) {
            warn!(
                "Slot conflict for specialist {} on {} at {}",
                specialist_id, date, time
            );
            return Err(AppointmentError::SlotTaken);
        }

        Ok(())
    }
}
