// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// The appointment status machine.
///
/// ```text
/// pending      -> confirmed | rejected | cancelled | rescheduled
/// confirmed    -> completed | cancelled | rescheduled
/// rescheduled  -> confirmed | completed | cancelled | rescheduled
/// rejected / cancelled / completed are terminal
/// ```
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(*current_status));
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Rejected,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Rescheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Rejected => vec![],
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::Completed => vec![],
        }
    }

    /// Completion is only meaningful once the scheduled time has passed.
    pub fn validate_completion_time(
        &self,
        scheduled_time: DateTime<Utc>,
        current_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if current_time < scheduled_time {
            return Err(AppointmentError::InvalidTime(
                "Appointment cannot be completed before its scheduled time".to_string(),
            ));
        }
        Ok(())
    }

    /// A reschedule may be proposed while the appointment is still live.
    pub fn can_propose_reschedule(&self, current_status: &AppointmentStatus) -> bool {
        matches!(
            current_status,
            AppointmentStatus::Pending
                | AppointmentStatus::Confirmed
                | AppointmentStatus::Rescheduled
        )
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
