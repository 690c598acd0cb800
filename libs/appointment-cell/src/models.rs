// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked consultation. Rows are never deleted: cancellation and
/// rejection are terminal statuses, not erasure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub specialist_id: Uuid,
    /// Calendar date of the consultation, no timezone attached.
    pub date: NaiveDate,
    /// Start of the 30-minute slot, interpreted as specialist-local.
    pub time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub status: AppointmentStatus,
    pub consent_document_ref: String,
    pub payment_proof_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Completed
                | AppointmentStatus::NoShow
        )
    }

    /// Whether an appointment in this status keeps its slot occupied.
    /// Completed and NoShow still block the slot: the time was held.
    pub fn blocks_slot(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Rejected
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    FirstVisit,
    FollowUp,
    Screening,
    Review,
}

impl AppointmentType {
    /// Instructions shown to the patient ahead of the visit. The type
    /// has no scheduling effect.
    pub fn pre_visit_instructions(&self) -> &'static str {
        match self {
            AppointmentType::FirstVisit => {
                "Bring a photo ID and any previous medical records relevant to your reason for visit."
            }
            AppointmentType::FollowUp => {
                "Bring the treatment plan and any test results from your previous consultation."
            }
            AppointmentType::Screening => {
                "Arrive with clean skin, free of creams or makeup on the area to be examined."
            }
            AppointmentType::Review => {
                "Bring the medication list and note any side effects since your last visit."
            }
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::FirstVisit => write!(f, "first_visit"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
            AppointmentType::Screening => write!(f, "screening"),
            AppointmentType::Review => write!(f, "review"),
        }
    }
}

/// Who is driving a state transition. Carries the caller's id so the
/// lifecycle service can check the actor is a party to the appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Patient(Uuid),
    Specialist(Uuid),
}

impl Actor {
    pub fn is_specialist_of(&self, appointment: &Appointment) -> bool {
        matches!(self, Actor::Specialist(id) if *id == appointment.specialist_id)
    }

    pub fn is_patient_of(&self, appointment: &Appointment) -> bool {
        matches!(self, Actor::Patient(id) if *id == appointment.patient_id)
    }

    pub fn is_party_to(&self, appointment: &Appointment) -> bool {
        self.is_specialist_of(appointment) || self.is_patient_of(appointment)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// The booking funnel's submission. Everything the funnel collects is
/// optional at the wire level so validation can report exactly which
/// precondition is missing, in funnel order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub specialty: Option<String>,
    pub specialist_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    /// Slot label, e.g. "09:00".
    pub time: Option<String>,
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
    pub consent_document_ref: Option<String>,
    pub payment_proof_ref: Option<String>,
}

/// A fully validated booking, ready for the hard availability check and
/// the store insert.
#[derive(Debug, Clone)]
pub struct ValidatedBooking {
    pub patient_id: Uuid,
    pub specialty: String,
    pub specialist_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub consent_document_ref: String,
    pub payment_proof_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: NaiveDate,
    /// Slot label, e.g. "10:00".
    pub new_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkNoShowRequest {
    /// The caller must have accepted an explicit confirmation prompt.
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

/// Taken and free slot labels for one specialist-day, as rendered by
/// the booking funnel's time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub specialist_id: Uuid,
    pub date: NaiveDate,
    pub taken: Vec<String>,
    pub free: Vec<String>,
}

/// Public URLs for the artifacts captured during booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUrls {
    pub consent_document_url: String,
    pub payment_proof_url: String,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot no longer available")]
    SlotTaken,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Specialist not found")]
    SpecialistNotFound,

    #[error("Specialist is not accepting appointments")]
    SpecialistNotAvailable,

    #[error("Specialist does not belong to the {specialty} specialty")]
    SpecialtyMismatch { specialty: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Not authorized to perform this action on the appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
