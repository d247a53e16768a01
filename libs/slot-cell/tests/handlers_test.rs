use assert_matches::assert_matches;
use axum::extract::{Extension, Path, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};
use slot_cell::handlers;
use slot_cell::models::CreateSlotRequest;

fn create_test_user_extension(role: &str, id: &str) -> Extension<User> {
    Extension(User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", role)),
        role: Some(role.to_string()),
        metadata: None,
        created_at: Some(Utc::now()),
    })
}

fn create_auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    let auth = Authorization::bearer(token).unwrap();
    TypedHeader(auth)
}

#[tokio::test]
async fn patients_cannot_create_slots() {
    let config = TestConfig::default();

    let request = CreateSlotRequest {
        start_time: Utc::now() + Duration::days(1),
        duration_minutes: 30,
        fee: 150.0,
    };

    let result = handlers::create_slot(
        State(config.to_arc()),
        create_auth_header("token"),
        create_test_user_extension("patient", &Uuid::new_v4().to_string()),
        Json(request),
    )
    .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn doctors_cannot_delete_other_doctors_slots() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let slot_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();
    let future = (Utc::now() + Duration::days(1)).to_rfc3339();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &owner_id.to_string(),
                &future,
                false,
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = handlers::delete_slot(
        State(config.to_arc()),
        Path(slot_id),
        create_auth_header("token"),
        create_test_user_extension("doctor", &Uuid::new_v4().to_string()),
    )
    .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn doctor_creates_own_slot() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let start_time = Utc::now() + Duration::days(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                &start_time.to_rfc3339(),
                false,
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = CreateSlotRequest {
        start_time,
        duration_minutes: 30,
        fee: 150.0,
    };

    let result = handlers::create_slot(
        State(config.to_arc()),
        create_auth_header("token"),
        create_test_user_extension("doctor", &doctor_id.to_string()),
        Json(request),
    )
    .await;

    let Json(body) = result.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["slot"]["doctor_id"], json!(doctor_id.to_string()));
}
