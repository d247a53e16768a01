// libs/slot-cell/src/handlers.rs
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

use crate::models::{CreateSlotRequest, OpenSlotsQuery, SlotError};
use crate::services::slots::SlotService;

#[derive(Debug, Deserialize)]
pub struct OpenSlotsParams {
    pub doctor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
}

fn map_slot_error(e: SlotError) -> AppError {
    match e {
        SlotError::NotFound => AppError::NotFound("Slot not found".to_string()),
        SlotError::AlreadyBooked => {
            AppError::Conflict("Slot is booked and cannot be deleted".to_string())
        }
        SlotError::Historical => {
            AppError::BadRequest("Past slots are kept for record keeping".to_string())
        }
        SlotError::Overlap => {
            AppError::Conflict("Slot overlaps with an existing slot".to_string())
        }
        SlotError::InvalidTime(msg) => AppError::BadRequest(msg),
        SlotError::ValidationError(msg) => AppError::BadRequest(msg),
        SlotError::Unauthorized => {
            AppError::Auth("Not authorized to manage this slot".to_string())
        }
        SlotError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

/// Doctors create bookable slots for themselves.
#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_doctor() {
        return Err(AppError::Auth("Only doctors can create slots".to_string()));
    }

    let doctor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid doctor ID".to_string()))?;

    let slot_service = SlotService::new(&state);
    let slot = slot_service
        .create_slot(doctor_id, request, token)
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot created successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let slot_service = SlotService::new(&state);

    let slot = slot_service
        .get_slot(slot_id, token)
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn list_open_slots(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<OpenSlotsParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let slot_service = SlotService::new(&state);

    let query = OpenSlotsQuery {
        doctor_id: params.doctor_id,
        from: params.from,
        to: params.to,
        limit: params.limit,
    };

    let slots = slot_service
        .list_open_slots(query, token)
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}

/// Owners delete their own unbooked future slots; admins can clean up any.
#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let slot_service = SlotService::new(&state);

    let slot = slot_service
        .get_slot(slot_id, token)
        .await
        .map_err(map_slot_error)?;

    let is_owner = slot.doctor_id.to_string() == user.id;
    if !is_owner && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to delete this slot".to_string()));
    }

    slot_service
        .delete_slot(slot_id, token)
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Slot deleted successfully"
    })))
}
