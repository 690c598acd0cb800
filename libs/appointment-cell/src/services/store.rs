// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::{StoreError, SupabaseClient};

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentError, ValidatedBooking,
};

/// The persistence seam for appointment records: the single writer every
/// other service goes through.
///
/// The `appointments` table carries a partial unique index on
/// `(specialist_id, date, time)` filtered to non-terminal statuses
/// (`status not in ('cancelled','rejected')`). PostgREST reports a
/// violation as HTTP 409, which this store surfaces as `SlotTaken` —
/// that index, not the pre-insert check, is what makes double-booking
/// impossible across concurrent clients.
pub struct AppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl AppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn map_store_error(e: StoreError) -> AppointmentError {
        match e {
            StoreError::Conflict(_) => AppointmentError::SlotTaken,
            StoreError::NotFound(_) => AppointmentError::NotFound,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn parse_appointment(value: &Value) -> Result<Appointment, AppointmentError> {
        serde_json::from_value(value.clone()).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })
    }

    fn parse_appointments(values: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v))
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }

    /// Insert a new appointment with status Pending. A 409 from the
    /// uniqueness index becomes `SlotTaken`.
    pub async fn create(
        &self,
        booking: &ValidatedBooking,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();

        let appointment_data = json!({
            "patient_id": booking.patient_id,
            "specialist_id": booking.specialist_id,
            "date": booking.date.to_string(),
            "time": booking.time.format("%H:%M:%S").to_string(),
            "appointment_type": booking.appointment_type.to_string(),
            "reason": booking.reason,
            "status": "pending",
            "consent_document_ref": booking.consent_document_ref,
            "payment_proof_ref": booking.payment_proof_ref,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_store_error)?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Failed to create appointment".to_string(),
            ));
        }

        let appointment = Self::parse_appointment(&result[0])?;
        info!(
            "Appointment {} created for specialist {} on {} at {}",
            appointment.id, appointment.specialist_id, appointment.date, appointment.time
        );

        Ok(appointment)
    }

    pub async fn get(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_store_error)?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        Self::parse_appointment(&result[0])
    }

    /// Patch one appointment. An empty result set means the row vanished
    /// between read and write; the caller refetches.
    pub async fn update(
        &self,
        appointment_id: Uuid,
        mut patch: serde_json::Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {}: {:?}", appointment_id, patch);

        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(patch)),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_store_error)?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        Self::parse_appointment(&result[0])
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        status: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut patch = serde_json::Map::new();
        patch.insert("status".to_string(), json!(status));
        self.update(appointment_id, patch, auth_token).await
    }

    pub async fn set_schedule(
        &self,
        appointment_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut patch = serde_json::Map::new();
        patch.insert("date".to_string(), json!(date.to_string()));
        patch.insert(
            "time".to_string(),
            json!(time.format("%H:%M:%S").to_string()),
        );
        self.update(appointment_id, patch, auth_token).await
    }

    pub async fn search(
        &self,
        query: &AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(specialist_id) = query.specialist_id {
            query_parts.push(format!("specialist_id=eq.{}", specialist_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!("date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!("date=lte.{}", to_date));
        }

        let mut path = format!(
            "/rest/v1/appointments?{}&order=date.desc,time.desc",
            query_parts.join("&")
        );

        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_store_error)?;

        Self::parse_appointments(result)
    }

    /// A specialist's agenda for one date, in slot order.
    pub async fn list_for_specialist_date(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?specialist_id=eq.{}&date=eq.{}&order=time.asc",
            specialist_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(Self::map_store_error)?;

        Self::parse_appointments(result)
    }
}
