use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentSearchQuery, AppointmentStatus, BookAppointmentRequest,
    CancelAppointmentRequest, CancelledBy, RejectAppointmentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn service_for(mock_server: &MockServer) -> AppointmentBookingService {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    AppointmentBookingService::new(&config)
}

async fn mock_patient_lookup(mock_server: &MockServer, patient_id: &Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id.to_string())
        ])))
        .mount(mock_server)
        .await;
}

async fn mock_slot_lookup(
    mock_server: &MockServer,
    slot_id: &Uuid,
    doctor_id: &Uuid,
    start_time: &str,
    is_booked: bool,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                start_time,
                is_booked,
            )
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn book_appointment_creates_pending_booking_and_consumes_slot() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(2)).to_rfc3339();

    mock_patient_lookup(&mock_server, &patient_id).await;
    mock_slot_lookup(&mock_server, &slot_id, &doctor_id, &start_time, false).await;

    // No active appointment holds the slot
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("slot_id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    // Slot is consumed in the same operation
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointment_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                &start_time,
                true,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = BookAppointmentRequest {
        patient_id,
        slot_id,
        reason: Some("Persistent headaches".to_string()),
    };

    let appointment = service.book_appointment(request, "token").await.unwrap();
    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.slot_id, slot_id);
}

#[tokio::test]
async fn book_appointment_rejects_unknown_patient() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = BookAppointmentRequest {
        patient_id,
        slot_id: Uuid::new_v4(),
        reason: None,
    };

    let result = service.book_appointment(request, "token").await;
    assert_matches!(result, Err(AppointmentError::PatientNotFound));
}

#[tokio::test]
async fn book_appointment_rejects_booked_slot() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(2)).to_rfc3339();

    mock_patient_lookup(&mock_server, &patient_id).await;
    mock_slot_lookup(&mock_server, &slot_id, &Uuid::new_v4(), &start_time, true).await;

    let request = BookAppointmentRequest {
        patient_id,
        slot_id,
        reason: None,
    };

    let result = service.book_appointment(request, "token").await;
    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn book_appointment_rejects_historical_slot() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let start_time = (Utc::now() - Duration::hours(1)).to_rfc3339();

    mock_patient_lookup(&mock_server, &patient_id).await;
    mock_slot_lookup(&mock_server, &slot_id, &Uuid::new_v4(), &start_time, false).await;

    let request = BookAppointmentRequest {
        patient_id,
        slot_id,
        reason: None,
    };

    let result = service.book_appointment(request, "token").await;
    assert_matches!(result, Err(AppointmentError::InvalidTime(_)));
}

#[tokio::test]
async fn book_appointment_enforces_single_active_holder_per_slot() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(2)).to_rfc3339();

    mock_patient_lookup(&mock_server, &patient_id).await;
    mock_slot_lookup(&mock_server, &slot_id, &doctor_id, &start_time, false).await;

    // Another pending appointment already references the slot
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("slot_id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = BookAppointmentRequest {
        patient_id,
        slot_id,
        reason: None,
    };

    let result = service.book_appointment(request, "token").await;
    assert_matches!(result, Err(AppointmentError::ConflictDetected));
}

#[tokio::test]
async fn cancelled_holder_does_not_block_rebooking() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(2)).to_rfc3339();

    mock_patient_lookup(&mock_server, &patient_id).await;
    mock_slot_lookup(&mock_server, &slot_id, &doctor_id, &start_time, false).await;

    // The previous booking on this slot was cancelled
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("slot_id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointment_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                &start_time,
                true,
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = BookAppointmentRequest {
        patient_id,
        slot_id,
        reason: None,
    };

    let result = service.book_appointment(request, "token").await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn confirm_appointment_moves_pending_to_confirmed() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &slot_id.to_string(),
                &start_time,
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &slot_id.to_string(),
                &start_time,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service.confirm_appointment(appointment_id, "token").await.unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn confirm_appointment_rejects_terminal_status() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &start_time,
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = service.confirm_appointment(appointment_id, "token").await;
    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Cancelled))
    );
}

#[tokio::test]
async fn reject_appointment_releases_the_slot() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "rejected",
            )
        ])))
        .mount(&mock_server)
        .await;

    // The slot must be released exactly once
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointment_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                &start_time,
                false,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RejectAppointmentRequest {
        note: Some("Fully booked that week".to_string()),
    };

    let appointment = service
        .reject_appointment(appointment_id, request, "token")
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Rejected);
}

#[tokio::test]
async fn cancel_appointment_releases_the_slot() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                &start_time,
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointment_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                &start_time,
                false,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = CancelAppointmentRequest {
        reason: "Feeling better".to_string(),
    };

    let appointment = service
        .cancel_appointment(appointment_id, request, CancelledBy::Patient, "token")
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn complete_appointment_requires_scheduled_time_to_have_passed() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let future_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &future_time,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = service.complete_appointment(appointment_id, "token").await;
    assert_matches!(result, Err(AppointmentError::InvalidTime(_)));
}

#[tokio::test]
async fn complete_appointment_marks_past_confirmed_appointment() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let past_time = (Utc::now() - Duration::hours(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &past_time,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &past_time,
                "completed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service.complete_appointment(appointment_id, "token").await.unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn search_appointments_filters_by_patient() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let start_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &start_time,
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let query = AppointmentSearchQuery {
        patient_id: Some(patient_id),
        doctor_id: None,
        status: None,
        from_date: None,
        to_date: None,
        limit: None,
        offset: None,
    };

    let appointments = service.search_appointments(query, "token").await.unwrap();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].patient_id, patient_id);
}
