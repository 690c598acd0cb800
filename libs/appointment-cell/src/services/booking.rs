// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use specialist_cell::models::SpecialistError;
use specialist_cell::services::DirectoryService;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, ArtifactUrls,
    AvailabilityResponse, BookAppointmentRequest, ValidatedBooking,
};
use crate::services::availability::AvailabilityService;
use crate::services::notify::{NotificationEvent, NotificationService};
use crate::services::slots;
use crate::services::store::AppointmentStore;

/// Drives the booking funnel to a single atomic appointment creation:
/// ordered precondition validation, party verification, the hard
/// availability check, the insert, and the fire-and-forget confirmation.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    availability: AvailabilityService,
    store: AppointmentStore,
    directory: DirectoryService,
    notifications: NotificationService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            availability: AvailabilityService::new(Arc::clone(&supabase)),
            store: AppointmentStore::new(Arc::clone(&supabase)),
            directory: DirectoryService::with_client(Arc::clone(&supabase)),
            notifications: NotificationService::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Book an appointment. On success the record is Pending and a
    /// confirmation notification is already in flight (its outcome never
    /// changes the booking result).
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with specialist {:?}",
            request.patient_id, request.specialist_id
        );

        // Step 1: every funnel precondition, in funnel order.
        let booking = validate_booking_request(&request, Local::now().naive_local())?;

        // Step 2: the patient must exist.
        self.verify_patient_exists(&booking.patient_id, auth_token).await?;

        // Step 3: the specialist must exist, be active, and belong to
        // the chosen specialty.
        self.verify_specialist(&booking, auth_token).await?;

        // Step 4: hard availability check, immediately before insert.
        self.availability
            .ensure_slot_free(
                booking.specialist_id,
                booking.date,
                booking.time,
                None,
                auth_token,
            )
            .await?;

        // Step 5: insert. The storage uniqueness index settles any race
        // two concurrent hard checks let through.
        let appointment = self.store.create(&booking, auth_token).await?;

        // Step 6: best-effort confirmation, never awaited.
        self.notifications
            .dispatch(NotificationEvent::Booked, &appointment, auth_token);

        info!(
            "Appointment {} booked for specialist {} on {} at {}",
            appointment.id, appointment.specialist_id, appointment.date, appointment.time
        );
        Ok(appointment)
    }

    /// The soft check backing the funnel's time step. Staleness is fine;
    /// the hard check re-validates at submission.
    pub async fn availability_for(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let taken = self
            .availability
            .taken_slots(specialist_id, date, None, auth_token)
            .await?;

        let mut taken_labels: Vec<String> = taken.iter().map(slots::format_label).collect();
        taken_labels.sort();

        let free = slots::day_slots()
            .into_iter()
            .filter(|slot| !taken.contains(slot))
            .map(|slot| slots::format_label(&slot))
            .collect();

        Ok(AvailabilityResponse {
            specialist_id,
            date,
            taken: taken_labels,
            free,
        })
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.store.get(appointment_id, auth_token).await
    }

    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.search(query, auth_token).await
    }

    pub async fn patient_appointments(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let query = AppointmentSearchQuery {
            patient_id: Some(patient_id),
            specialist_id: None,
            status: None,
            from_date: None,
            to_date: None,
            limit: None,
            offset: None,
        };
        self.store.search(&query, auth_token).await
    }

    pub async fn specialist_agenda(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .list_for_specialist_date(specialist_id, date, auth_token)
            .await
    }

    /// Resolve the booking artifacts to public URLs for display.
    pub async fn artifact_urls(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<ArtifactUrls, AppointmentError> {
        let appointment = self.store.get(appointment_id, auth_token).await?;

        Ok(ArtifactUrls {
            consent_document_url: self.supabase.get_public_url(&appointment.consent_document_ref),
            payment_proof_url: self.supabase.get_public_url(&appointment.payment_proof_ref),
        })
    }

    async fn verify_patient_exists(
        &self,
        patient_id: &Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }

        Ok(())
    }

    async fn verify_specialist(
        &self,
        booking: &ValidatedBooking,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Validating specialist: {}", booking.specialist_id);

        let specialist = self
            .directory
            .get_specialist(booking.specialist_id, auth_token)
            .await
            .map_err(|e| match e {
                SpecialistError::NotFound => AppointmentError::SpecialistNotFound,
                SpecialistError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            })?;

        if !specialist.is_active {
            return Err(AppointmentError::SpecialistNotAvailable);
        }

        if !specialist.specialty.eq_ignore_ascii_case(&booking.specialty) {
            return Err(AppointmentError::SpecialtyMismatch {
                specialty: booking.specialty.clone(),
            });
        }

        Ok(())
    }
}

/// Check every funnel precondition in the order the funnel collects
/// them, reporting the first one that is missing or invalid.
pub fn validate_booking_request(
    request: &BookAppointmentRequest,
    now: NaiveDateTime,
) -> Result<ValidatedBooking, AppointmentError> {
    let specialty = match request.specialty.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            return Err(AppointmentError::ValidationError(
                "No specialty selected".to_string(),
            ))
        }
    };

    let specialist_id = request.specialist_id.ok_or_else(|| {
        AppointmentError::ValidationError("No specialist selected".to_string())
    })?;

    let date = request.date.ok_or_else(|| {
        AppointmentError::ValidationError("No date selected".to_string())
    })?;

    let time_label = request.time.as_deref().ok_or_else(|| {
        AppointmentError::ValidationError("No time slot selected".to_string())
    })?;
    let time = slots::parse_label(time_label).ok_or_else(|| {
        AppointmentError::ValidationError("Selected time is not a bookable slot".to_string())
    })?;

    slots::validate_schedule(date, time, now)?;

    let reason = match request.reason.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => {
            return Err(AppointmentError::ValidationError(
                "Reason for visit is required".to_string(),
            ))
        }
    };

    let consent_document_ref = match request.consent_document_ref.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => {
            return Err(AppointmentError::ValidationError(
                "Signed consent document is required".to_string(),
            ))
        }
    };

    let payment_proof_ref = match request.payment_proof_ref.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => {
            return Err(AppointmentError::ValidationError(
                "Payment proof is required".to_string(),
            ))
        }
    };

    Ok(ValidatedBooking {
        patient_id: request.patient_id,
        specialty,
        specialist_id,
        date,
        time,
        appointment_type: request.appointment_type,
        reason,
        consent_document_ref,
        payment_proof_ref,
    })
}
