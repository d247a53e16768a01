// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use slot_cell::models::SlotError;
use slot_cell::services::slots::SlotService;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, CancelAppointmentRequest, CancelledBy, RejectAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    slot_service: SlotService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            slot_service: SlotService::new(config),
            supabase,
        }
    }

    /// Book a slot on behalf of a patient.
    ///
    /// Creates a pending appointment carrying the slot's time, duration and
    /// fee, and consumes the slot in the same operation.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking slot {} for patient {}", request.slot_id, request.patient_id);

        self.verify_patient_exists(&request.patient_id, auth_token).await?;

        let slot = self.slot_service
            .get_slot(request.slot_id, auth_token)
            .await
            .map_err(map_slot_error)?;

        if slot.is_historical(Utc::now()) {
            return Err(AppointmentError::InvalidTime(
                "Slot has already started".to_string(),
            ));
        }
        if !slot.is_available || slot.is_booked {
            return Err(AppointmentError::SlotNotAvailable);
        }

        self.conflict_service
            .ensure_slot_free(slot.id, None, auth_token)
            .await?;

        let now = Utc::now();
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": slot.doctor_id,
            "slot_id": slot.id,
            "scheduled_time": slot.start_time.to_rfc3339(),
            "duration_minutes": slot.duration_minutes,
            "fee": slot.fee,
            "status": AppointmentStatus::Pending.to_string(),
            "reason": request.reason,
            "cancellation_note": Value::Null,
            "pending_reschedule": Value::Null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError("Failed to create appointment".to_string()));
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e)))?;

        self.slot_service
            .mark_booked(slot.id, auth_token)
            .await
            .map_err(map_slot_error)?;

        info!("Appointment {} booked on slot {}", appointment.id, slot.id);
        Ok(appointment)
    }

    /// Doctor accepts a pending (or re-confirms a rescheduled) appointment.
    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Confirming appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Confirmed)?;

        let updated = self.update_status(&current, AppointmentStatus::Confirmed, None, auth_token).await?;

        info!("Appointment {} confirmed", appointment_id);
        Ok(updated)
    }

    /// Doctor declines a pending appointment; the slot opens up again.
    pub async fn reject_appointment(
        &self,
        appointment_id: Uuid,
        request: RejectAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rejecting appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Rejected)?;

        let note = request.note.unwrap_or_else(|| "Rejected by doctor".to_string());
        let updated = self
            .update_status(&current, AppointmentStatus::Rejected, Some(note), auth_token)
            .await?;

        self.slot_service
            .release_slot(current.slot_id, auth_token)
            .await
            .map_err(map_slot_error)?;

        info!("Appointment {} rejected, slot {} released", appointment_id, current.slot_id);
        Ok(updated)
    }

    /// Either party cancels a live appointment; the slot opens up again.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        cancelled_by: CancelledBy,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Cancelled)?;

        let note = format!("Cancelled by {:?}: {}", cancelled_by, request.reason);
        let updated = self
            .update_status(&current, AppointmentStatus::Cancelled, Some(note), auth_token)
            .await?;

        self.slot_service
            .release_slot(current.slot_id, auth_token)
            .await
            .map_err(map_slot_error)?;

        info!("Appointment {} cancelled by {:?}, slot {} released",
              appointment_id, cancelled_by, current.slot_id);
        Ok(updated)
    }

    /// Doctor marks a consultation as held. Only valid once the scheduled
    /// time has passed.
    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Completing appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Completed)?;
        self.lifecycle_service
            .validate_completion_time(current.scheduled_time, Utc::now())?;

        let updated = self
            .update_status(&current, AppointmentStatus::Completed, None, auth_token)
            .await?;

        info!("Appointment {} completed", appointment_id);
        Ok(updated)
    }

    /// Get appointment by ID
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Search appointments with filters
    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            let encoded = urlencoding::encode(&from_date.to_rfc3339()).into_owned();
            query_parts.push(format!("scheduled_time=gte.{}", encoded));
        }
        if let Some(to_date) = query.to_date {
            let encoded = urlencoding::encode(&to_date.to_rfc3339()).into_owned();
            query_parts.push(format!("scheduled_time=lte.{}", encoded));
        }

        let mut path = format!(
            "/rest/v1/appointments?{}&order=scheduled_time.desc",
            query_parts.join("&")
        );

        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
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

        Ok(appointments)
    }

    /// Get upcoming live appointments (configurable hours ahead)
    pub async fn get_upcoming_appointments(
        &self,
        patient_id: Option<Uuid>,
        doctor_id: Option<Uuid>,
        hours_ahead: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let now = Utc::now();
        // Round to whole seconds to avoid nanosecond precision issues with PostgreSQL
        let rounded_now = now.with_nanosecond(0).unwrap_or(now);
        let future_time = rounded_now + ChronoDuration::hours(hours_ahead.unwrap_or(24) as i64);

        let query = AppointmentSearchQuery {
            patient_id,
            doctor_id,
            status: None,
            from_date: Some(rounded_now),
            to_date: Some(future_time),
            limit: Some(50),
            offset: None,
        };

        let mut appointments = self.search_appointments(query, auth_token).await?;

        appointments.retain(|apt| matches!(apt.status,
            AppointmentStatus::Pending |
            AppointmentStatus::Confirmed |
            AppointmentStatus::Rescheduled
        ));

        Ok(appointments)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn verify_patient_exists(&self, patient_id: &Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }

        Ok(())
    }

    async fn update_status(
        &self,
        current: &Appointment,
        new_status: AppointmentStatus,
        cancellation_note: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(new_status.to_string()));

        if let Some(note) = cancellation_note {
            update_data.insert("cancellation_note".to_string(), json!(note));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", current.id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError("Failed to update appointment".to_string()));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse updated appointment: {}", e)))
    }
}

/// Slot-cell failures seen through the appointment workflow.
pub(crate) fn map_slot_error(e: SlotError) -> AppointmentError {
    match e {
        SlotError::NotFound => AppointmentError::SlotNotFound,
        SlotError::AlreadyBooked => AppointmentError::SlotNotAvailable,
        SlotError::Historical => {
            AppointmentError::InvalidTime("Slot has already started".to_string())
        }
        SlotError::Overlap => AppointmentError::ConflictDetected,
        SlotError::InvalidTime(msg) => AppointmentError::InvalidTime(msg),
        SlotError::ValidationError(msg) => AppointmentError::ValidationError(msg),
        SlotError::Unauthorized => AppointmentError::Unauthorized,
        SlotError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
    }
}
