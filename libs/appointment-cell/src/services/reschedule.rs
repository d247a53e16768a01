// libs/appointment-cell/src/services/reschedule.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use slot_cell::services::slots::SlotService;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ProposeRescheduleRequest, ProposerRole,
    RescheduleProposal,
};
use crate::services::booking::map_slot_error;
use crate::services::lifecycle::AppointmentLifecycleService;

/// The bilateral reschedule negotiation.
///
/// Either party proposes a new time; only the counterparty can approve or
/// decline, and only the proposer can withdraw. Approval moves the
/// appointment (and its slot) to the proposed time.
pub struct RescheduleService {
    supabase: Arc<SupabaseClient>,
    lifecycle_service: AppointmentLifecycleService,
    slot_service: SlotService,
}

impl RescheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            lifecycle_service: AppointmentLifecycleService::new(),
            slot_service: SlotService::new(config),
        }
    }

    /// Record a new reschedule proposal on a live appointment.
    pub async fn propose_reschedule(
        &self,
        appointment_id: Uuid,
        actor: ProposerRole,
        request: ProposeRescheduleRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("{} proposing reschedule for appointment {}", actor, appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if !self.lifecycle_service.can_propose_reschedule(&current.status) {
            return Err(AppointmentError::InvalidStatusTransition(current.status));
        }
        if current.active_proposal().is_some() {
            return Err(AppointmentError::ProposalPending);
        }
        if request.proposed_time <= Utc::now() {
            return Err(AppointmentError::InvalidTime(
                "Proposed time must be in the future".to_string(),
            ));
        }

        let proposal = RescheduleProposal {
            proposed_by: actor,
            proposed_time: request.proposed_time,
            reason: request.reason,
            is_active: true,
            proposed_at: Utc::now(),
        };

        let updated = self
            .write_proposal(&current, &proposal, None, auth_token)
            .await?;

        info!("Reschedule proposed by {} on appointment {} for {}",
              actor, appointment_id, request.proposed_time);
        Ok(updated)
    }

    /// Counterparty accepts: the appointment and its slot move to the
    /// proposed time and the appointment becomes `rescheduled`.
    pub async fn approve_reschedule(
        &self,
        appointment_id: Uuid,
        actor: ProposerRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("{} approving reschedule for appointment {}", actor, appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let proposal = current
            .active_proposal()
            .cloned()
            .ok_or(AppointmentError::NoActiveProposal)?;

        if proposal.proposed_by == actor {
            return Err(AppointmentError::NotProposalCounterparty);
        }

        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Rescheduled)?;

        let resolved = RescheduleProposal {
            is_active: false,
            ..proposal.clone()
        };

        let updated = self
            .write_proposal(
                &current,
                &resolved,
                Some((AppointmentStatus::Rescheduled, proposal.proposed_time)),
                auth_token,
            )
            .await?;

        // The slot stays consumed by this appointment; it moves along with it.
        self.slot_service
            .move_slot(current.slot_id, proposal.proposed_time, auth_token)
            .await
            .map_err(map_slot_error)?;

        info!("Appointment {} rescheduled to {}", appointment_id, proposal.proposed_time);
        Ok(updated)
    }

    /// Counterparty declines: the proposal is resolved, nothing moves.
    pub async fn decline_reschedule(
        &self,
        appointment_id: Uuid,
        actor: ProposerRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("{} declining reschedule for appointment {}", actor, appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let proposal = current
            .active_proposal()
            .cloned()
            .ok_or(AppointmentError::NoActiveProposal)?;

        if proposal.proposed_by == actor {
            return Err(AppointmentError::NotProposalCounterparty);
        }

        let resolved = RescheduleProposal {
            is_active: false,
            ..proposal
        };

        let updated = self
            .write_proposal(&current, &resolved, None, auth_token)
            .await?;

        info!("Reschedule declined on appointment {}", appointment_id);
        Ok(updated)
    }

    /// Proposer takes their own proposal back.
    pub async fn withdraw_reschedule(
        &self,
        appointment_id: Uuid,
        actor: ProposerRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("{} withdrawing reschedule for appointment {}", actor, appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let proposal = current
            .active_proposal()
            .cloned()
            .ok_or(AppointmentError::NoActiveProposal)?;

        if proposal.proposed_by != actor {
            return Err(AppointmentError::NotProposalOwner);
        }

        let resolved = RescheduleProposal {
            is_active: false,
            ..proposal
        };

        let updated = self
            .write_proposal(&current, &resolved, None, auth_token)
            .await?;

        info!("Reschedule withdrawn on appointment {}", appointment_id);
        Ok(updated)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
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

    async fn write_proposal(
        &self,
        current: &Appointment,
        proposal: &RescheduleProposal,
        move_to: Option<(AppointmentStatus, chrono::DateTime<Utc>)>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut update_data = serde_json::Map::new();

        let proposal_value = serde_json::to_value(proposal)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to serialize proposal: {}", e)))?;
        update_data.insert("pending_reschedule".to_string(), proposal_value);

        if let Some((new_status, new_time)) = move_to {
            update_data.insert("status".to_string(), json!(new_status.to_string()));
            update_data.insert("scheduled_time".to_string(), json!(new_time.to_rfc3339()));
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
