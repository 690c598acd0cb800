// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{Local, NaiveDate};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Actor, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, MarkNoShowRequest, RescheduleAppointmentRequest,
};
use crate::services::booking::BookingService;
use crate::services::lifecycle::LifecycleService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailabilityQueryParams {
    pub specialist_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub patient_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AgendaQueryParams {
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// HELPERS
// ==============================================================================

fn map_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotTaken => AppError::Conflict("Slot no longer available".to_string()),
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::SpecialistNotFound => {
            AppError::NotFound("Specialist not found".to_string())
        }
        AppointmentError::SpecialistNotAvailable => {
            AppError::BadRequest("Specialist is not accepting appointments".to_string())
        }
        AppointmentError::SpecialtyMismatch { specialty } => AppError::BadRequest(format!(
            "Specialist does not belong to the {} specialty",
            specialty
        )),
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::InvalidStatusTransition(status) => AppError::BadRequest(format!(
            "Appointment cannot be modified in current status: {}",
            status
        )),
        AppointmentError::Unauthorized => {
            AppError::Auth("Not authorized to perform this action on the appointment".to_string())
        }
        AppointmentError::DatabaseError(msg) => AppError::Unavailable(msg),
    }
}

fn actor_from_user(user: &User) -> Result<Actor, AppError> {
    let id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    match user.role.as_deref() {
        Some("specialist") => Ok(Actor::Specialist(id)),
        Some("patient") => Ok(Actor::Patient(id)),
        _ => Err(AppError::Auth(
            "Only patients and specialists may drive appointments".to_string(),
        )),
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Only the patient themselves, or an admin on their behalf, may book.
    let is_patient = request.patient_id.to_string() == user.id;
    if !is_patient && !user.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to book appointment for this patient".to_string(),
        ));
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .book_appointment(request, token)
        .await
        .map_err(map_error)?;

    let instructions = appointment.appointment_type.pre_visit_instructions();

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "pre_visit_instructions": instructions,
        "message": "Appointment requested; awaiting specialist confirmation"
    })))
}

/// The soft availability check the funnel's time step renders. Staleness
/// is tolerated; submission re-checks.
#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AvailabilityQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let availability = booking_service
        .availability_for(params.specialist_id, params.date, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "availability": availability
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    let is_party = appointment.patient_id.to_string() == user.id
        || appointment.specialist_id.to_string() == user.id;
    if !is_party && !user.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "pre_visit_instructions": appointment.appointment_type.pre_visit_instructions()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_artifacts(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    let is_party = appointment.patient_id.to_string() == user.id
        || appointment.specialist_id.to_string() == user.id;
    if !is_party && !user.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    let artifacts = booking_service
        .artifact_urls(appointment_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "artifacts": artifacts
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let mut query = AppointmentSearchQuery {
        patient_id: params.patient_id,
        specialist_id: params.specialist_id,
        status: params.status,
        from_date: params.from_date,
        to_date: params.to_date,
        limit: params.limit,
        offset: params.offset,
    };

    // Non-admin callers only ever see their own appointments.
    if !user.is_admin() {
        let own_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;
        if user.is_specialist() {
            query.specialist_id = Some(own_id);
        } else {
            query.patient_id = Some(own_id);
        }
    }

    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .search_appointments(&query, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "count": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if patient_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to view this patient's appointments".to_string(),
        ));
    }

    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .patient_appointments(patient_id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "count": appointments.len()
    })))
}

/// A specialist's agenda for one date (defaults to today).
#[axum::debug_handler]
pub async fn get_specialist_agenda(
    State(state): State<Arc<AppConfig>>,
    Path(specialist_id): Path<Uuid>,
    Query(params): Query<AgendaQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if specialist_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to view this specialist's agenda".to_string(),
        ));
    }

    let date = params.date.unwrap_or_else(|| Local::now().date_naive());
    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .specialist_agenda(specialist_id, date, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "date": date,
        "appointments": appointments,
        "count": appointments.len()
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let lifecycle = LifecycleService::new(&state);

    let appointment = lifecycle
        .confirm(appointment_id, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn reject_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let lifecycle = LifecycleService::new(&state);

    let appointment = lifecycle
        .reject(appointment_id, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rejected"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let lifecycle = LifecycleService::new(&state);

    let appointment = lifecycle
        .cancel(appointment_id, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let lifecycle = LifecycleService::new(&state);

    let appointment = lifecycle
        .reschedule(appointment_id, &request, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let lifecycle = LifecycleService::new(&state);

    let appointment = lifecycle
        .complete(appointment_id, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Consultation completed"
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<MarkNoShowRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;
    let lifecycle = LifecycleService::new(&state);

    let appointment = lifecycle
        .mark_no_show(appointment_id, request.confirmed, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment marked as no-show"
    })))
}
