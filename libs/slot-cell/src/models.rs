// libs/slot-cell/src/models.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable time window owned by one doctor.
///
/// A slot is consumed when an appointment is booked against it and released
/// when that appointment is rejected or cancelled. Booked or past slots are
/// retained as history and cannot be deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub fee: f64,
    pub is_available: bool,
    pub is_booked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// A slot is historical once its start time has passed.
    pub fn is_historical(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    /// Open means bookable: available, unconsumed, and still in the future.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.is_available && !self.is_booked && !self.is_historical(now)
    }

    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start_time < other_end && self.end_time() > other_start
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSlotsQuery {
    pub doctor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SlotValidationRules {
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub max_advance_booking_days: i32,
}

impl Default for SlotValidationRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
            max_duration_minutes: 180,
            max_advance_booking_days: 90,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SlotError {
    #[error("Slot not found")]
    NotFound,

    #[error("Slot is already booked")]
    AlreadyBooked,

    #[error("Slot is historical and kept for record keeping")]
    Historical,

    #[error("Slot overlaps with an existing slot")]
    Overlap,

    #[error("Invalid slot time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized access to slot")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
