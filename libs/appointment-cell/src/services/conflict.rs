// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

/// Guards the slot invariant: a slot is referenced by at most one active
/// (non-cancelled, non-rejected) appointment at a time.
pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// All active appointments currently holding a slot.
    pub async fn active_appointments_for_slot(
        &self,
        slot_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Checking active appointments for slot {}", slot_id);

        let mut path = format!("/rest/v1/appointments?slot_id=eq.{}", slot_id);
        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments
            .into_iter()
            .filter(|apt| apt.status.is_active())
            .collect())
    }

    /// Error out if the slot is already held by an active appointment.
    pub async fn ensure_slot_free(
        &self,
        slot_id: Uuid,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let holders = self
            .active_appointments_for_slot(slot_id, exclude_appointment_id, auth_token)
            .await?;

        if !holders.is_empty() {
            warn!("Slot {} already held by {} active appointment(s)", slot_id, holders.len());
            return Err(AppointmentError::ConflictDetected);
        }

        Ok(())
    }
}
