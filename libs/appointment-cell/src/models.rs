// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booking binding one patient to one doctor-owned slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub fee: f64,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub cancellation_note: Option<String>,
    pub pending_reschedule: Option<RescheduleProposal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.scheduled_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// The reschedule proposal currently awaiting a response, if any.
    pub fn active_proposal(&self) -> Option<&RescheduleProposal> {
        self.pending_reschedule.as_ref().filter(|p| p.is_active)
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.patient_id.to_string() == user_id || self.doctor_id.to_string() == user_id
    }

    /// Role of a participant within this appointment, if they are one.
    pub fn role_of(&self, user_id: &str) -> Option<ProposerRole> {
        if self.patient_id.to_string() == user_id {
            Some(ProposerRole::Patient)
        } else if self.doctor_id.to_string() == user_id {
            Some(ProposerRole::Doctor)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Rejected,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Active appointments keep their slot consumed. Rejected and cancelled
    /// ones release it, so a slot carries at most one active appointment.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Rejected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Completed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

// ==============================================================================
// RESCHEDULE PROPOSAL MODELS
// ==============================================================================

/// Which side of the appointment an actor is on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposerRole {
    Doctor,
    Patient,
}

impl ProposerRole {
    pub fn counterparty(&self) -> ProposerRole {
        match self {
            ProposerRole::Doctor => ProposerRole::Patient,
            ProposerRole::Patient => ProposerRole::Doctor,
        }
    }
}

impl fmt::Display for ProposerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposerRole::Doctor => write!(f, "doctor"),
            ProposerRole::Patient => write!(f, "patient"),
        }
    }
}

/// A mutually-approvable request to move an appointment to a new time.
///
/// Exactly one proposal can be awaiting a response at a time; a resolved
/// proposal stays on the record with `is_active = false` until the next
/// one overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleProposal {
    pub proposed_by: ProposerRole,
    pub proposed_time: DateTime<Utc>,
    pub reason: Option<String>,
    pub is_active: bool,
    pub proposed_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectAppointmentRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeRescheduleRequest {
    pub proposed_time: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Appointment slot not available")]
    SlotNotAvailable,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Slot is already held by another appointment")]
    ConflictDetected,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("A reschedule proposal is already awaiting a response")]
    ProposalPending,

    #[error("No reschedule proposal is awaiting a response")]
    NoActiveProposal,

    #[error("Only the counterparty can respond to a reschedule proposal")]
    NotProposalCounterparty,

    #[error("Only the proposer can withdraw a reschedule proposal")]
    NotProposalOwner,

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
