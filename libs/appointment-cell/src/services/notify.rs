// libs/appointment-cell/src/services/notify.rs
use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_database::supabase::SupabaseClient;

use crate::models::Appointment;

#[derive(Debug, Clone, Copy)]
pub enum NotificationEvent {
    Booked,
    Confirmed,
    Rescheduled,
}

impl NotificationEvent {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::Booked => "booked",
            NotificationEvent::Confirmed => "confirmed",
            NotificationEvent::Rescheduled => "rescheduled",
        }
    }
}

/// Best-effort side channel for patient-facing notifications.
///
/// Dispatch spawns a detached task: the booking and lifecycle workflows
/// never await the send, and a failed send is logged, never propagated.
pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
}

impl NotificationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub fn dispatch(&self, event: NotificationEvent, appointment: &Appointment, auth_token: &str) {
        let supabase = Arc::clone(&self.supabase);
        let appointment = appointment.clone();
        let token = auth_token.to_string();

        tokio::spawn(async move {
            if let Err(e) = Self::send(&supabase, event, &appointment, &token).await {
                warn!(
                    "Notification '{}' for appointment {} failed: {}",
                    event.as_str(),
                    appointment.id,
                    e
                );
            }
        });
    }

    async fn send(
        supabase: &SupabaseClient,
        event: NotificationEvent,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<()> {
        let body = json!({
            "event": event.as_str(),
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "specialist_id": appointment.specialist_id,
            "date": appointment.date.to_string(),
            "time": appointment.time.format("%H:%M").to_string(),
        });

        let _: Value = supabase
            .request(
                Method::POST,
                "/functions/v1/send-appointment-confirmation",
                Some(auth_token),
                Some(body),
            )
            .await?;

        debug!(
            "Notification '{}' dispatched for appointment {}",
            event.as_str(),
            appointment.id
        );
        Ok(())
    }
}
