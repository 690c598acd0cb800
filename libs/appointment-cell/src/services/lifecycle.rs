// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use uuid::Uuid;

use crate::models::{Actor, Appointment, AppointmentError, AppointmentStatus, RescheduleAppointmentRequest};
use crate::services::availability::AvailabilityService;
use crate::services::notify::{NotificationEvent, NotificationService};
use crate::services::slots;
use crate::services::store::AppointmentStore;

/// A specialist may close out a consultation up to this many minutes
/// before its scheduled start.
pub const COMPLETION_GRACE_MINUTES: i64 = 30;

/// The single authoritative transition function: every caller
/// (dashboards, patient list, specialist detail) goes through here, so
/// no screen can invent its own state rules.
pub struct LifecycleService {
    availability: AvailabilityService,
    store: AppointmentStore,
    notifications: NotificationService,
}

impl LifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            availability: AvailabilityService::new(Arc::clone(&supabase)),
            store: AppointmentStore::new(Arc::clone(&supabase)),
            notifications: NotificationService::new(supabase),
        }
    }

    /// Valid next statuses for a given current status. Terminal
    /// statuses return an empty list.
    pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Rejected,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Rejected
            | AppointmentStatus::Cancelled
            | AppointmentStatus::Completed
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_transition(
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !Self::valid_transitions(current).contains(&next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition(current));
        }

        Ok(())
    }

    /// The completion gate: only on the scheduled day, and no earlier
    /// than the grace window before the scheduled time.
    pub fn validate_completion_window(
        date: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<(), AppointmentError> {
        if date != now.date() {
            return Err(AppointmentError::ValidationError(
                "Appointments can only be completed on their scheduled day".to_string(),
            ));
        }

        let gate_opens = time - Duration::minutes(COMPLETION_GRACE_MINUTES);
        if now.time() < gate_opens {
            return Err(AppointmentError::ValidationError(format!(
                "Consultation cannot be completed before {}",
                slots::format_label(&gate_opens)
            )));
        }

        Ok(())
    }

    /// Specialist accepts a pending appointment. The patient is told
    /// best-effort.
    pub async fn confirm(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;

        if !actor.is_specialist_of(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Self::validate_transition(appointment.status, AppointmentStatus::Confirmed)?;

        let updated = self
            .store
            .set_status(appointment_id, "confirmed", auth_token)
            .await?;

        self.notifications
            .dispatch(NotificationEvent::Confirmed, &updated, auth_token);

        info!("Appointment {} confirmed", appointment_id);
        Ok(updated)
    }

    /// Specialist declines a pending appointment; the slot frees up.
    pub async fn reject(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;

        if !actor.is_specialist_of(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Self::validate_transition(appointment.status, AppointmentStatus::Rejected)?;

        let updated = self
            .store
            .set_status(appointment_id, "rejected", auth_token)
            .await?;

        info!("Appointment {} rejected", appointment_id);
        Ok(updated)
    }

    /// Either party may cancel while the appointment is still live.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;

        if !actor.is_party_to(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Self::validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let updated = self
            .store
            .set_status(appointment_id, "cancelled", auth_token)
            .await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(updated)
    }

    /// Move a live appointment to a new slot, identity and status
    /// unchanged. Runs the same hard availability check as booking,
    /// against the new slot, excluding the appointment itself.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: &RescheduleAppointmentRequest,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;

        if !actor.is_party_to(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }

        // Only live appointments can move; date/time edits are not a
        // status transition, so the check is on liveness, not the table.
        if appointment.status.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let new_time = slots::parse_label(&request.new_time).ok_or_else(|| {
            AppointmentError::ValidationError(
                "Selected time is not a bookable slot".to_string(),
            )
        })?;

        slots::validate_schedule(request.new_date, new_time, Local::now().naive_local())?;

        self.availability
            .ensure_slot_free(
                appointment.specialist_id,
                request.new_date,
                new_time,
                Some(appointment_id),
                auth_token,
            )
            .await?;

        let updated = self
            .store
            .set_schedule(appointment_id, request.new_date, new_time, auth_token)
            .await?;

        self.notifications
            .dispatch(NotificationEvent::Rescheduled, &updated, auth_token);

        info!(
            "Appointment {} rescheduled to {} at {}",
            appointment_id, updated.date, updated.time
        );
        Ok(updated)
    }

    /// Specialist closes out a consultation happening today, within the
    /// grace window.
    pub async fn complete(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;

        if !actor.is_specialist_of(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Self::validate_transition(appointment.status, AppointmentStatus::Completed)?;
        Self::validate_completion_window(
            appointment.date,
            appointment.time,
            Local::now().naive_local(),
        )?;

        let updated = self
            .store
            .set_status(appointment_id, "completed", auth_token)
            .await?;

        info!("Appointment {} completed", appointment_id);
        Ok(updated)
    }

    /// Specialist records that the patient did not show. Requires the
    /// explicit confirmation flag from the UI prompt.
    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        confirmed: bool,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !confirmed {
            return Err(AppointmentError::ValidationError(
                "Marking a no-show requires explicit confirmation".to_string(),
            ));
        }

        let appointment = self.store.get(appointment_id, auth_token).await?;

        if !actor.is_specialist_of(&appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Self::validate_transition(appointment.status, AppointmentStatus::NoShow)?;

        let updated = self
            .store
            .set_status(appointment_id, "no_show", auth_token)
            .await?;

        info!("Appointment {} marked as no-show", appointment_id);
        Ok(updated)
    }
}
