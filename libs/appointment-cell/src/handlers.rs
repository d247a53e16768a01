// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, CancelAppointmentRequest, CancelledBy, ProposeRescheduleRequest,
    ProposerRole, RejectAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::reschedule::RescheduleService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingAppointmentsQuery {
    pub hours_ahead: Option<i32>,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
        AppointmentError::SlotNotAvailable => {
            AppError::BadRequest("Appointment slot no longer available".to_string())
        }
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::ConflictDetected => {
            AppError::Conflict("Slot is already held by another appointment".to_string())
        }
        AppointmentError::InvalidStatusTransition(status) => {
            AppError::BadRequest(format!("Cannot transition from current status: {}", status))
        }
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::ProposalPending => {
            AppError::Conflict("A reschedule proposal is already awaiting a response".to_string())
        }
        AppointmentError::NoActiveProposal => {
            AppError::BadRequest("No reschedule proposal is awaiting a response".to_string())
        }
        AppointmentError::NotProposalCounterparty => {
            AppError::Auth("Only the counterparty can respond to this proposal".to_string())
        }
        AppointmentError::NotProposalOwner => {
            AppError::Auth("Only the proposer can withdraw this proposal".to_string())
        }
        AppointmentError::Unauthorized => {
            AppError::Auth("Not authorized to access this appointment".to_string())
        }
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

/// Fetch the appointment and require the caller to be its doctor (or admin).
async fn load_as_doctor(
    service: &AppointmentBookingService,
    appointment_id: Uuid,
    user: &User,
    token: &str,
) -> Result<Appointment, AppError> {
    let appointment = service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    let is_doctor = appointment.doctor_id.to_string() == user.id;
    if !is_doctor && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to manage this appointment".to_string()));
    }

    Ok(appointment)
}

/// Fetch the appointment and resolve which side of it the caller is on.
/// The reschedule negotiation is strictly between the two parties.
async fn load_party_role(
    service: &AppointmentBookingService,
    appointment_id: Uuid,
    user: &User,
    token: &str,
) -> Result<ProposerRole, AppError> {
    let appointment = service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    appointment
        .role_of(&user.id)
        .ok_or_else(|| AppError::Auth("Not a party to this appointment".to_string()))
}

// ==============================================================================
// BOOKING AND LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Only the patient themselves or an admin can book
    let is_patient = request.patient_id.to_string() == user.id;
    if !is_patient && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to book appointment for this patient".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .book_appointment(request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    if !appointment.involves(&user.id) && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    load_as_doctor(&booking_service, appointment_id, &user, token).await?;

    let appointment = booking_service
        .confirm_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

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
    Json(request): Json<RejectAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    load_as_doctor(&booking_service, appointment_id, &user, token).await?;

    let appointment = booking_service
        .reject_appointment(appointment_id, request, token)
        .await
        .map_err(map_appointment_error)?;

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
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    let cancelled_by = match appointment.role_of(&user.id) {
        Some(ProposerRole::Patient) => CancelledBy::Patient,
        Some(ProposerRole::Doctor) => CancelledBy::Doctor,
        None if user.is_admin() => CancelledBy::System,
        None => {
            return Err(AppError::Auth("Not authorized to cancel this appointment".to_string()));
        }
    };

    let cancelled = booking_service
        .cancel_appointment(appointment_id, request, cancelled_by, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": cancelled,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    load_as_doctor(&booking_service, appointment_id, &user, token).await?;

    let appointment = booking_service
        .complete_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

// ==============================================================================
// RESCHEDULE NEGOTIATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn propose_reschedule(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ProposeRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let actor = load_party_role(&booking_service, appointment_id, &user, token).await?;

    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .propose_reschedule(appointment_id, actor, request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Reschedule proposed"
    })))
}

#[axum::debug_handler]
pub async fn approve_reschedule(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let actor = load_party_role(&booking_service, appointment_id, &user, token).await?;

    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .approve_reschedule(appointment_id, actor, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Reschedule approved"
    })))
}

#[axum::debug_handler]
pub async fn decline_reschedule(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let actor = load_party_role(&booking_service, appointment_id, &user, token).await?;

    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .decline_reschedule(appointment_id, actor, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Reschedule declined"
    })))
}

#[axum::debug_handler]
pub async fn withdraw_reschedule(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let actor = load_party_role(&booking_service, appointment_id, &user, token).await?;

    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .withdraw_reschedule(appointment_id, actor, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Reschedule withdrawn"
    })))
}

// ==============================================================================
// SEARCH AND LISTING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let mut search_query = AppointmentSearchQuery {
        patient_id: params.patient_id,
        doctor_id: params.doctor_id,
        status: params.status,
        from_date: params.from_date,
        to_date: params.to_date,
        limit: params.limit,
        offset: params.offset,
    };

    // Non-admins only ever see their own appointments
    if !user.is_admin() {
        if user.is_doctor() {
            if let Ok(doctor_uuid) = Uuid::parse_str(&user.id) {
                search_query.doctor_id = Some(doctor_uuid);
            }
        } else if let Ok(patient_uuid) = Uuid::parse_str(&user.id) {
            search_query.patient_id = Some(patient_uuid);
        }
    }

    let appointments = booking_service
        .search_appointments(search_query, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
        "limit": params.limit,
        "offset": params.offset
    })))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<UpcomingAppointmentsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let (patient_id, doctor_id) = if user.is_admin() {
        (None, None)
    } else if user.is_doctor() {
        let doctor_uuid = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::BadRequest("Invalid doctor ID".to_string()))?;
        (None, Some(doctor_uuid))
    } else {
        let patient_uuid = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::BadRequest("Invalid patient ID".to_string()))?;
        (Some(patient_uuid), None)
    };

    let appointments = booking_service
        .get_upcoming_appointments(patient_id, doctor_id, params.hours_ahead, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "upcoming_appointments": appointments,
        "total": appointments.len(),
        "hours_ahead": params.hours_ahead.unwrap_or(24)
    })))
}
