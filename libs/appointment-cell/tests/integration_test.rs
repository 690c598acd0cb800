use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Local, NaiveDate};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_app(config: &TestConfig) -> Router {
    appointment_routes(Arc::new(config.to_app_config()))
}

fn tomorrow() -> NaiveDate {
    Local::now().date_naive() + Duration::days(1)
}

fn yesterday() -> NaiveDate {
    Local::now().date_naive() - Duration::days(1)
}

async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token));

    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or(json!({}))
    };

    (status, value)
}

fn booking_body(patient_id: &str, specialist_id: &str, date: NaiveDate, time: &str) -> Value {
    json!({
        "patient_id": patient_id,
        "specialty": "Dermatólogo",
        "specialist_id": specialist_id,
        "date": date.to_string(),
        "time": time,
        "appointment_type": "first_visit",
        "reason": "Persistent rash on forearm",
        "consent_document_ref": "consents/consent-123.pdf",
        "payment_proof_ref": "receipts/receipt-123.png"
    })
}

/// Mocks for the pre-insert path: patient lookup, specialist lookup, and
/// the taken-slot query (with the terminal statuses filtered out).
async fn mount_booking_lookups(
    mock_server: &MockServer,
    patient_id: &str,
    specialist_id: &str,
    taken_rows: Value,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(patient_id, "patient@example.com", "Test Patient")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/specialists"))
        .and(query_param("id", format!("eq.{}", specialist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::specialist_response(specialist_id, "Dr. X", "Dermatólogo")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("specialist_id", format!("eq.{}", specialist_id)))
        .and(query_param("status", "not.in.(cancelled,rejected)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(taken_rows))
        .mount(mock_server)
        .await;
}

async fn mount_notification_sink(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/functions/v1/send-appointment-confirmation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"delivered": true})))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_book_appointment_success() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let date = tomorrow();

    mount_booking_lookups(&mock_server, &patient.id, &specialist_id, json!([])).await;
    mount_notification_sink(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id,
                &patient.id,
                &specialist_id,
                &date.to_string(),
                "09:00:00",
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        "/",
        &token,
        Some(booking_body(&patient.id, &specialist_id, date, "09:00")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["appointment"]["status"], json!("pending"));
    assert!(body["pre_visit_instructions"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn test_book_appointment_hard_check_conflict() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4().to_string();
    let date = tomorrow();

    // Another patient already holds 09:00.
    let taken = json!([{
        "id": Uuid::new_v4().to_string(),
        "time": "09:00:00",
        "status": "pending"
    }]);
    mount_booking_lookups(&mock_server, &patient.id, &specialist_id, taken).await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        "/",
        &token,
        Some(booking_body(&patient.id, &specialist_id, date, "09:00")),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("no longer available"));
}

#[tokio::test]
async fn test_book_appointment_insert_race_surfaces_conflict() {
    // Both hard checks saw the slot free; the storage unique index
    // rejects the second insert with 409.
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4().to_string();
    let date = tomorrow();

    mount_booking_lookups(&mock_server, &patient.id, &specialist_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response(
                "duplicate key value violates unique constraint",
                "23505",
            ),
        ))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, _body) = send_json(
        app,
        "POST",
        "/",
        &token,
        Some(booking_body(&patient.id, &specialist_id, date, "09:00")),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_book_appointment_past_date_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        "/",
        &token,
        Some(booking_body(
            &patient.id,
            &Uuid::new_v4().to_string(),
            yesterday(),
            "09:00",
        )),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("past"));
}

#[tokio::test]
async fn test_book_appointment_missing_consent_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let mut body = booking_body(&patient.id, &Uuid::new_v4().to_string(), tomorrow(), "09:00");
    body["consent_document_ref"] = Value::Null;

    let (status, response) = send_json(app, "POST", "/", &token, Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("consent"));
}

#[tokio::test]
async fn test_book_appointment_for_other_patient_forbidden() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, _body) = send_json(
        app,
        "POST",
        "/",
        &token,
        Some(booking_body(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            tomorrow(),
            "09:00",
        )),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[tokio::test]
async fn test_availability_empty_day_offers_all_slots() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("specialist_id", format!("eq.{}", specialist_id)))
        .and(query_param("status", "not.in.(cancelled,rejected)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "GET",
        &format!("/availability?specialist_id={}&date=2025-12-10", specialist_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let free = body["availability"]["free"].as_array().unwrap();
    assert_eq!(free.len(), 16);
    assert_eq!(free[0], json!("08:00"));
    assert_eq!(body["availability"]["taken"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_availability_marks_taken_slots() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4();

    // One pending booking at 09:00; the store has already filtered out
    // cancelled/rejected rows per the status query.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "not.in.(cancelled,rejected)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4().to_string(), "time": "09:00:00", "status": "pending" }
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "GET",
        &format!("/availability?specialist_id={}&date=2025-12-10", specialist_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let taken = body["availability"]["taken"].as_array().unwrap();
    let free = body["availability"]["free"].as_array().unwrap();
    assert_eq!(taken, &vec![json!("09:00")]);
    assert_eq!(free.len(), 15);
    assert!(!free.contains(&json!("09:00")));
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

async fn mount_appointment_fetch(
    mock_server: &MockServer,
    appointment_id: &str,
    patient_id: &str,
    specialist_id: &str,
    date: &str,
    status: &str,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                appointment_id,
                patient_id,
                specialist_id,
                date,
                "10:00:00",
                status,
            )
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_specialist_confirms_pending_appointment() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let specialist = TestUser::specialist("derm@example.com");
    let patient_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let date = tomorrow().to_string();

    mount_appointment_fetch(&mock_server, &appointment_id, &patient_id, &specialist.id, &date, "pending").await;
    mount_notification_sink(&mock_server).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id,
                &patient_id,
                &specialist.id,
                &date,
                "10:00:00",
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&specialist, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/confirm", appointment_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], json!("confirmed"));
}

#[tokio::test]
async fn test_patient_cannot_confirm() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mount_appointment_fetch(
        &mock_server,
        &appointment_id,
        &patient.id,
        &Uuid::new_v4().to_string(),
        &tomorrow().to_string(),
        "pending",
    )
    .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, _body) = send_json(
        app,
        "POST",
        &format!("/{}/confirm", appointment_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_terminal_appointment_rejects_transitions() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let specialist = TestUser::specialist("derm@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mount_appointment_fetch(
        &mock_server,
        &appointment_id,
        &Uuid::new_v4().to_string(),
        &specialist.id,
        &tomorrow().to_string(),
        "cancelled",
    )
    .await;

    let token = JwtTestUtils::create_test_token(&specialist, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/confirm", appointment_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("current status"));
}

#[tokio::test]
async fn test_patient_cancels_own_appointment() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let date = tomorrow().to_string();

    mount_appointment_fetch(&mock_server, &appointment_id, &patient.id, &specialist_id, &date, "confirmed").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id,
                &patient.id,
                &specialist_id,
                &date,
                "10:00:00",
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/cancel", appointment_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], json!("cancelled"));
}

#[tokio::test]
async fn test_complete_on_wrong_day_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let specialist = TestUser::specialist("derm@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    // Scheduled tomorrow: the completion gate can never be open today.
    mount_appointment_fetch(
        &mock_server,
        &appointment_id,
        &Uuid::new_v4().to_string(),
        &specialist.id,
        &tomorrow().to_string(),
        "confirmed",
    )
    .await;

    let token = JwtTestUtils::create_test_token(&specialist, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/complete", appointment_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("scheduled day"));
}

#[tokio::test]
async fn test_no_show_requires_explicit_confirmation() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let specialist = TestUser::specialist("derm@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    let token = JwtTestUtils::create_test_token(&specialist, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "POST",
        &format!("/{}/no-show", appointment_id),
        &token,
        Some(json!({"confirmed": false})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("confirmation"));
}

#[tokio::test]
async fn test_reschedule_moves_to_free_slot() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let old_date = tomorrow().to_string();
    let new_date = (tomorrow() + Duration::days(1)).to_string();

    mount_appointment_fetch(&mock_server, &appointment_id, &patient.id, &specialist_id, &old_date, "pending").await;
    mount_notification_sink(&mock_server).await;

    // Hard re-check against the new day must exclude the moving
    // appointment itself.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("date", format!("eq.{}", new_date)))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id,
                &patient.id,
                &specialist_id,
                &new_date,
                "10:00:00",
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, body) = send_json(
        app,
        "PATCH",
        &format!("/{}/reschedule", appointment_id),
        &token,
        Some(json!({"new_date": new_date, "new_time": "10:00"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["date"], json!(new_date));
    assert_eq!(body["appointment"]["status"], json!("pending"));
}

#[tokio::test]
async fn test_reschedule_into_taken_slot_conflicts() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let specialist_id = Uuid::new_v4().to_string();
    let appointment_id = Uuid::new_v4().to_string();
    let new_date = (tomorrow() + Duration::days(1)).to_string();

    mount_appointment_fetch(
        &mock_server,
        &appointment_id,
        &patient.id,
        &specialist_id,
        &tomorrow().to_string(),
        "confirmed",
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("date", format!("eq.{}", new_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4().to_string(), "time": "10:00:00", "status": "confirmed" }
        ])))
        .mount(&mock_server)
        .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, _body) = send_json(
        app,
        "PATCH",
        &format!("/{}/reschedule", appointment_id),
        &token,
        Some(json!({"new_date": new_date, "new_time": "10:00"})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reschedule_to_past_date_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());

    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4().to_string();

    mount_appointment_fetch(
        &mock_server,
        &appointment_id,
        &patient.id,
        &Uuid::new_v4().to_string(),
        &tomorrow().to_string(),
        "pending",
    )
    .await;

    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);
    let app = create_test_app(&config);

    let (status, _body) = send_json(
        app,
        "PATCH",
        &format!("/{}/reschedule", appointment_id),
        &token,
        Some(json!({"new_date": yesterday().to_string(), "new_time": "10:00"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==============================================================================
// AUTH PLUMBING
// ==============================================================================

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let config = TestConfig::default();
    let app = create_test_app(&config);

    let request = Request::builder()
        .method("GET")
        .uri("/search")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_expired_token(&patient, &config.jwt_secret);
    let app = create_test_app(&config);

    let (status, _body) = send_json(app, "GET", "/search", &token, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
