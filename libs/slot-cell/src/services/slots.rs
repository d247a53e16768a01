// libs/slot-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{CreateSlotRequest, OpenSlotsQuery, Slot, SlotError, SlotValidationRules};

pub struct SlotService {
    supabase: Arc<SupabaseClient>,
    validation_rules: SlotValidationRules,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            validation_rules: SlotValidationRules::default(),
        }
    }

    pub fn with_rules(config: &AppConfig, validation_rules: SlotValidationRules) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            validation_rules,
        }
    }

    /// Create a new bookable slot for a doctor.
    ///
    /// The window must lie in the future, within the advance-booking horizon,
    /// and must not overlap another slot of the same doctor.
    pub async fn create_slot(
        &self,
        doctor_id: Uuid,
        request: CreateSlotRequest,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        debug!("Creating slot for doctor {} at {}", doctor_id, request.start_time);

        self.validate_create_request(&request)?;
        self.check_slot_overlap(doctor_id, &request, auth_token).await?;

        let now = Utc::now();
        let slot_data = json!({
            "doctor_id": doctor_id,
            "start_time": request.start_time.to_rfc3339(),
            "duration_minutes": request.duration_minutes,
            "fee": request.fee,
            "is_available": true,
            "is_booked": false,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointment_slots",
            Some(auth_token),
            Some(slot_data),
            Some(headers),
        ).await.map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SlotError::DatabaseError("Failed to create slot".to_string()));
        }

        let slot: Slot = serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse created slot: {}", e)))?;

        info!("Slot {} created for doctor {}", slot.id, doctor_id);
        Ok(slot)
    }

    /// Get slot by ID
    pub async fn get_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        debug!("Fetching slot: {}", slot_id);

        let path = format!("/rest/v1/appointment_slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SlotError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// List open (available, unbooked, future) slots, optionally per doctor.
    pub async fn list_open_slots(
        &self,
        query: OpenSlotsQuery,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let from = query.from.unwrap_or_else(Utc::now);

        let mut query_parts = vec![
            "is_available=eq.true".to_string(),
            "is_booked=eq.false".to_string(),
            format!("start_time=gte.{}", urlencoding::encode(&from.to_rfc3339())),
        ];

        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(to) = query.to {
            query_parts.push(format!("start_time=lte.{}", urlencoding::encode(&to.to_rfc3339())));
        }

        let mut path = format!(
            "/rest/v1/appointment_slots?{}&order=start_time.asc",
            query_parts.join("&")
        );
        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        let slots: Vec<Slot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Slot>, _>>()
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slots: {}", e)))?;

        debug!("Found {} open slots", slots.len());
        Ok(slots)
    }

    /// Delete an unbooked, non-historical slot.
    ///
    /// Booked slots are consumed by an appointment; past slots are history.
    /// Both are retained.
    pub async fn delete_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<(), SlotError> {
        debug!("Deleting slot: {}", slot_id);

        let slot = self.get_slot(slot_id, auth_token).await?;

        if slot.is_booked {
            warn!("Refusing to delete booked slot {}", slot_id);
            return Err(SlotError::AlreadyBooked);
        }
        if slot.is_historical(Utc::now()) {
            return Err(SlotError::Historical);
        }

        let path = format!("/rest/v1/appointment_slots?id=eq.{}", slot_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(headers),
        ).await.map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        info!("Slot {} deleted", slot_id);
        Ok(())
    }

    /// Consume a slot for a booked appointment.
    pub async fn mark_booked(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        self.update_slot_flags(slot_id, true, auth_token).await
    }

    /// Release a slot whose appointment was rejected or cancelled.
    pub async fn release_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        self.update_slot_flags(slot_id, false, auth_token).await
    }

    /// Move a slot to a new start time (approved reschedule).
    pub async fn move_slot(
        &self,
        slot_id: Uuid,
        new_start_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        debug!("Moving slot {} to {}", slot_id, new_start_time);

        let update_data = json!({
            "start_time": new_start_time.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        self.patch_slot(slot_id, update_data, auth_token).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_create_request(&self, request: &CreateSlotRequest) -> Result<(), SlotError> {
        let now = Utc::now();

        if request.start_time <= now {
            return Err(SlotError::InvalidTime(
                "Slot must start in the future".to_string()
            ));
        }

        let max_advance = ChronoDuration::days(self.validation_rules.max_advance_booking_days as i64);
        if request.start_time >= now + max_advance {
            return Err(SlotError::InvalidTime(
                format!("Slot cannot start more than {} days in advance",
                       self.validation_rules.max_advance_booking_days)
            ));
        }

        if request.duration_minutes < self.validation_rules.min_duration_minutes {
            return Err(SlotError::ValidationError(
                format!("Slot duration must be at least {} minutes",
                       self.validation_rules.min_duration_minutes)
            ));
        }
        if request.duration_minutes > self.validation_rules.max_duration_minutes {
            return Err(SlotError::ValidationError(
                format!("Slot duration cannot exceed {} minutes",
                       self.validation_rules.max_duration_minutes)
            ));
        }

        if request.fee < 0.0 {
            return Err(SlotError::ValidationError(
                "Slot fee cannot be negative".to_string()
            ));
        }

        Ok(())
    }

    async fn check_slot_overlap(
        &self,
        doctor_id: Uuid,
        request: &CreateSlotRequest,
        auth_token: &str,
    ) -> Result<(), SlotError> {
        let new_end = request.start_time + ChronoDuration::minutes(request.duration_minutes as i64);

        // Only future slots can overlap a future window
        let path = format!(
            "/rest/v1/appointment_slots?doctor_id=eq.{}&start_time=gte.{}",
            doctor_id,
            urlencoding::encode(&Utc::now().to_rfc3339())
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        let existing: Vec<Slot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Slot>, _>>()
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slots: {}", e)))?;

        for slot in existing {
            if slot.overlaps(request.start_time, new_end) {
                warn!("Slot overlap for doctor {} at {}", doctor_id, request.start_time);
                return Err(SlotError::Overlap);
            }
        }

        Ok(())
    }

    async fn update_slot_flags(
        &self,
        slot_id: Uuid,
        booked: bool,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        debug!("Updating slot {} flags: booked={}", slot_id, booked);

        let update_data = json!({
            "is_booked": booked,
            "is_available": !booked,
            "updated_at": Utc::now().to_rfc3339()
        });

        self.patch_slot(slot_id, update_data, auth_token).await
    }

    async fn patch_slot(
        &self,
        slot_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        let path = format!("/rest/v1/appointment_slots?id=eq.{}", slot_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SlotError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse updated slot: {}", e)))
    }
}
