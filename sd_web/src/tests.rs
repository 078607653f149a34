//! ABOUTME: HTTP-level tests for the assembled application
//! ABOUTME: Exercise sessions, role checks, branch scoping, money flows and error shapes

use crate::{auth::PasswordAuth, create_app, AppState};
use actix_web::{body::MessageBody, cookie::Cookie, dev::ServiceResponse, http::StatusCode, test};
use sd_config::Config;
use sd_db::{
    Branch, BranchRepository, CreateBranchRequest, CreateSeatRequest, CreateShiftRequest,
    CreateUserRequest, Db, Seat, SeatRepository, Shift, ShiftRepository, User, UserRepository,
};
use sd_obs::Metrics;
use serde_json::{json, Value};
use std::sync::Arc;
use test_support::{unique_email, unique_name, TEST_DATE, TEST_MONTH, TEST_PASSWORD, TEST_SESSION_SECRET};

async fn test_state_with_limit(requests_per_minute: u32) -> AppState {
    let db = Db::in_memory().await.expect("Failed to create test database");

    let mut config = Config::default();
    config.security.session_secret = TEST_SESSION_SECRET.to_string();
    config.server.rate_limit.requests_per_minute = requests_per_minute;

    AppState::new(db, &config, Arc::new(Metrics::new()))
}

async fn test_state() -> AppState {
    test_state_with_limit(1000).await
}

async fn seed_user(state: &AppState, role: &str, branch_id: Option<&str>) -> User {
    UserRepository::new(state.db.pool())
        .create(CreateUserRequest {
            username: unique_name(role),
            email: unique_email(role),
            password_hash: PasswordAuth::hash_password(TEST_PASSWORD).expect("hash"),
            role: role.to_string(),
            branch_id: branch_id.map(str::to_string),
        })
        .await
        .expect("Failed to create test user")
}

async fn seed_branch(state: &AppState) -> Branch {
    BranchRepository::new(state.db.pool())
        .create(CreateBranchRequest {
            name: unique_name("branch"),
            address: None,
            phone: None,
        })
        .await
        .expect("Failed to create branch")
}

async fn seed_shift(state: &AppState, branch_id: &str, name: &str, fee: i64) -> Shift {
    ShiftRepository::new(state.db.pool())
        .create(CreateShiftRequest {
            branch_id: branch_id.to_string(),
            name: name.to_string(),
            start_time: "06:00".to_string(),
            end_time: "12:00".to_string(),
            monthly_fee: fee,
        })
        .await
        .expect("Failed to create shift")
}

async fn seed_seat(state: &AppState, branch_id: &str, label: &str) -> Seat {
    SeatRepository::new(state.db.pool())
        .create(CreateSeatRequest {
            branch_id: branch_id.to_string(),
            label: label.to_string(),
        })
        .await
        .expect("Failed to create seat")
}

fn bearer(state: &AppState, user: &User) -> (&'static str, String) {
    let token = state.tokens.issue(user).expect("Failed to issue token");
    ("authorization", format!("Bearer {}", token))
}

async fn status_and_json<B: MessageBody>(resp: ServiceResponse<B>) -> (StatusCode, Value) {
    let status = resp.status();
    let body = test::read_body(resp).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

/// Call the app and decode the JSON body (Null when empty)
macro_rules! send {
    ($app:expr, $req:expr) => {
        status_and_json(test::call_service($app, $req).await).await
    };
}

fn student_body(branch_id: &str, name: &str) -> Value {
    json!({
        "branchId": branch_id,
        "name": name,
        "phone": "9876543210",
        "monthlyFee": 3000,
        "joiningDate": "2024-01-05",
    })
}

#[actix_web::test]
async fn test_health_needs_no_session() {
    let state = test_state().await;
    let app = test::init_service(create_app(state)).await;

    let (status, body) = send!(&app, test::TestRequest::get().uri("/api/health").to_request());
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_login_sets_session_cookie_usable_for_me() {
    let state = test_state().await;
    let user = seed_user(&state, "staff", None).await;
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": user.email, "password": TEST_PASSWORD}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie: Cookie<'static> = resp
        .response()
        .cookies()
        .find(|c| c.name() == "session")
        .expect("session cookie")
        .into_owned();
    assert_eq!(cookie.http_only(), Some(true));

    let body: Value = test::read_body_json(resp).await;
    assert!(body["accessToken"].is_string());
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["user"]["role"], "staff");

    let req = test::TestRequest::get().uri("/api/me").cookie(cookie).to_request();
    let (status, me) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user.id.as_str());
}

#[actix_web::test]
async fn test_bad_credentials_are_problem_json_and_counted() {
    let state = test_state().await;
    let user = seed_user(&state, "admin", None).await;
    let metrics = Arc::clone(&state.metrics);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": user.email, "password": "wrong_password"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );

    let text = metrics.encode().unwrap();
    assert!(text.contains("logins_total{outcome=\"failure\"} 1"));
}

#[actix_web::test]
async fn test_disabled_account_cannot_log_in() {
    let state = test_state().await;
    let user = seed_user(&state, "staff", None).await;
    UserRepository::new(state.db.pool())
        .deactivate(&user.id)
        .await
        .unwrap();
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": user.email, "password": TEST_PASSWORD}))
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Account is disabled");
}

#[actix_web::test]
async fn test_missing_or_forged_session_is_401() {
    let state = test_state().await;
    let app = test::init_service(create_app(state)).await;

    let (status, body) = send!(&app, test::TestRequest::get().uri("/api/me").to_request());
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let req = test::TestRequest::get()
        .uri("/api/students")
        .insert_header(("authorization", "Bearer not.a.token"))
        .to_request();
    let (status, _) = send!(&app, req);
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_role_checks() {
    let state = test_state().await;
    let staff = seed_user(&state, "staff", None).await;
    let manager = seed_user(&state, "manager", None).await;
    let staff_auth = bearer(&state, &staff);
    let manager_auth = bearer(&state, &manager);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get()
        .uri("/api/users")
        .insert_header(staff_auth.clone())
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["title"], "Forbidden");

    let req = test::TestRequest::get()
        .uri("/api/reports/profit-loss")
        .insert_header(staff_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/reports/profit-loss")
        .insert_header(manager_auth)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::OK);

    // Same path, different method, different role
    let req = test::TestRequest::get()
        .uri("/api/branches")
        .insert_header(staff_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/branches")
        .insert_header(staff_auth)
        .set_json(json!({"name": "North"}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_first_run_setup() {
    let state = test_state().await;
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get().uri("/api/auth/setup/needed").to_request();
    let (_, body) = send!(&app, req);
    assert_eq!(body["needsSetup"], true);

    let signup = json!({"username": "owner", "email": "owner@example.com", "password": "long_enough_pw"});
    let req = test::TestRequest::post()
        .uri("/api/auth/setup/signup")
        .set_json(&signup)
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "admin");

    let req = test::TestRequest::get().uri("/api/auth/setup/needed").to_request();
    let (_, body) = send!(&app, req);
    assert_eq!(body["needsSetup"], false);

    let req = test::TestRequest::post()
        .uri("/api/auth/setup/signup")
        .set_json(&signup)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_logout_expires_cookie() {
    let state = test_state().await;
    let app = test::init_service(create_app(state)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/auth/logout").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "session")
        .expect("removal cookie");
    assert_eq!(cookie.value(), "");
}

#[actix_web::test]
async fn test_seat_is_exclusive_per_shift() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let branch = seed_branch(&state).await;
    let morning = seed_shift(&state, &branch.id, "Morning", 2500).await;
    let evening = seed_shift(&state, &branch.id, "Evening", 2000).await;
    let seat = seed_seat(&state, &branch.id, "A1").await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let mut first = student_body(&branch.id, "Asha");
    first["seatId"] = json!(seat.id);
    first["shiftId"] = json!(morning.id);
    first.as_object_mut().unwrap().remove("monthlyFee");
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth.clone())
        .set_json(&first)
        .to_request();
    let (status, created) = send!(&app, req);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["monthlyFee"], 2500, "fee defaults to the shift's");

    let mut clash = student_body(&branch.id, "Bilal");
    clash["seatId"] = json!(seat.id);
    clash["shiftId"] = json!(morning.id);
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth.clone())
        .set_json(&clash)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CONFLICT);

    clash["shiftId"] = json!(evening.id);
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth.clone())
        .set_json(&clash)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/seats/availability?branchId={}&shiftId={}",
            branch.id, morning.id
        ))
        .insert_header(auth.clone())
        .to_request();
    let (status, seats) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seats[0]["occupied"], true);
    assert_eq!(seats[0]["studentId"], created["id"]);

    // Deactivating frees the seat for the shift
    let req = test::TestRequest::delete()
        .uri(&format!("/api/students/{}", created["id"].as_str().unwrap()))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    clash["shiftId"] = json!(morning.id);
    clash["name"] = json!("Chitra");
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth)
        .set_json(&clash)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CREATED);
}

#[actix_web::test]
async fn test_allocation_must_be_complete_and_local() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let branch = seed_branch(&state).await;
    let other = seed_branch(&state).await;
    let seat = seed_seat(&state, &branch.id, "B2").await;
    let foreign_shift = seed_shift(&state, &other.id, "Morning", 2000).await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let mut body = student_body(&branch.id, "Dev");
    body["seatId"] = json!(seat.id);
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth.clone())
        .set_json(&body)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);

    body["shiftId"] = json!(foreign_shift.id);
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth)
        .set_json(&body)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_collection_and_profit_loss() {
    let state = test_state().await;
    let manager = seed_user(&state, "manager", None).await;
    let branch = seed_branch(&state).await;
    let auth = bearer(&state, &manager);
    let metrics = Arc::clone(&state.metrics);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(auth.clone())
        .set_json(student_body(&branch.id, "Esha"))
        .to_request();
    let (_, student) = send!(&app, req);

    let req = test::TestRequest::post()
        .uri("/api/transactions")
        .insert_header(auth.clone())
        .set_json(json!({
            "studentId": student["id"],
            "amount": 1800,
            "paymentMode": "upi",
            "forMonth": TEST_MONTH,
            "paidOn": TEST_DATE,
        }))
        .to_request();
    let (status, collection) = send!(&app, req);
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(collection["branchId"], branch.id.as_str());
    assert_eq!(collection["collectedBy"], manager.id.as_str());

    let req = test::TestRequest::post()
        .uri("/api/expenses")
        .insert_header(auth.clone())
        .set_json(json!({
            "branchId": branch.id,
            "category": "electricity",
            "amount": 500,
            "spentOn": TEST_DATE,
        }))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!("/api/reports/profit-loss?month={}", TEST_MONTH))
        .insert_header(auth.clone())
        .to_request();
    let (status, report) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["totalCollected"], 1800);
    assert_eq!(report["totalExpenses"], 500);
    assert_eq!(report["netProfit"], 1300);
    assert_eq!(report["collectionsByMode"][0]["key"], "upi");

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/students/{}/transactions",
            student["id"].as_str().unwrap()
        ))
        .insert_header(auth)
        .to_request();
    let (_, ledger) = send!(&app, req);
    assert_eq!(ledger.as_array().unwrap().len(), 1);

    assert!(metrics.encode().unwrap().contains("collected_amount_total 1800"));
}

#[actix_web::test]
async fn test_dues_report_and_student_due() {
    let state = test_state().await;
    let staff = seed_user(&state, "staff", None).await;
    let branch = seed_branch(&state).await;
    let auth = bearer(&state, &staff);
    let app = test::init_service(create_app(state)).await;

    let mut ids = Vec::new();
    for name in ["Farah", "Gopal"] {
        let req = test::TestRequest::post()
            .uri("/api/students")
            .insert_header(auth.clone())
            .set_json(student_body(&branch.id, name))
            .to_request();
        let (_, student) = send!(&app, req);
        ids.push(student["id"].as_str().unwrap().to_string());
    }

    // Farah pays in full, Gopal pays a third
    for (id, amount) in [(&ids[0], 3000), (&ids[1], 1000)] {
        let req = test::TestRequest::post()
            .uri("/api/transactions")
            .insert_header(auth.clone())
            .set_json(json!({
                "studentId": id,
                "amount": amount,
                "paymentMode": "cash",
                "forMonth": TEST_MONTH,
                "paidOn": TEST_DATE,
            }))
            .to_request();
        assert_eq!(send!(&app, req).0, StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/api/reports/dues?month={}", TEST_MONTH))
        .insert_header(auth.clone())
        .to_request();
    let (status, dues) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dues["totalDue"], 2000);
    assert_eq!(dues["students"].as_array().unwrap().len(), 1);
    assert_eq!(dues["students"][0]["name"], "Gopal");

    let req = test::TestRequest::get()
        .uri(&format!("/api/students/{}/due?month={}", ids[0], TEST_MONTH))
        .insert_header(auth)
        .to_request();
    let (_, due) = send!(&app, req);
    assert_eq!(due["paid"], 3000);
    assert_eq!(due["due"], 0);
}

#[actix_web::test]
async fn test_branch_bound_staff_is_scoped() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let home = seed_branch(&state).await;
    let away = seed_branch(&state).await;
    let staff = seed_user(&state, "staff", Some(&home.id)).await;
    let admin_auth = bearer(&state, &admin);
    let staff_auth = bearer(&state, &staff);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(admin_auth.clone())
        .set_json(student_body(&away.id, "Hari"))
        .to_request();
    let (_, away_student) = send!(&app, req);

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(admin_auth)
        .set_json(student_body(&home.id, "Isha"))
        .to_request();
    send!(&app, req);

    let req = test::TestRequest::get()
        .uri(&format!("/api/students?branchId={}", away.id))
        .insert_header(staff_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/students")
        .insert_header(staff_auth.clone())
        .to_request();
    let (_, students) = send!(&app, req);
    let students = students.as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["name"], "Isha");

    let req = test::TestRequest::get()
        .uri(&format!("/api/students/{}", away_student["id"].as_str().unwrap()))
        .insert_header(staff_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(staff_auth)
        .set_json(student_body(&away.id, "Jai"))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_login_is_rate_limited() {
    let state = test_state_with_limit(2).await;
    let app = test::init_service(create_app(state)).await;

    let attempt = || {
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "nobody@example.com", "password": "guess"}))
            .to_request()
    };

    assert_eq!(send!(&app, attempt()).0, StatusCode::UNAUTHORIZED);
    assert_eq!(send!(&app, attempt()).0, StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, attempt()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 429);
}

#[actix_web::test]
async fn test_validation_failures_are_400_problem_json() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/branches")
        .insert_header(auth.clone())
        .set_json(json!({"name": "North", "phone": "12ab"}))
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "phone");

    let req = test::TestRequest::post()
        .uri("/api/branches")
        .insert_header(auth.clone())
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );

    let req = test::TestRequest::get()
        .uri("/api/reports/summary?month=2024-13")
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/transactions")
        .insert_header(auth)
        .set_json(json!({
            "studentId": "missing",
            "amount": 0,
            "paymentMode": "cash",
            "forMonth": TEST_MONTH,
        }))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_shift_window_and_unknown_student() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let branch = seed_branch(&state).await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/shifts")
        .insert_header(auth.clone())
        .set_json(json!({
            "branchId": branch.id,
            "name": "Backwards",
            "startTime": "18:00",
            "endTime": "09:00",
            "monthlyFee": 1000,
        }))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/transactions")
        .insert_header(auth)
        .set_json(json!({
            "studentId": "01HZZZZZZZZZZZZZZZZZZZZZZZ",
            "amount": 100,
            "paymentMode": "cash",
            "forMonth": TEST_MONTH,
        }))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_admin_cannot_deactivate_self() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let staff = seed_user(&state, "staff", None).await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}", admin.id))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}", staff.id))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header(auth)
        .to_request();
    let (status, stats) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["tableCounts"]["users"], 2);
}

#[actix_web::test]
async fn test_staff_cannot_toggle_student_activation() {
    let state = test_state().await;
    let staff = seed_user(&state, "staff", None).await;
    let manager = seed_user(&state, "manager", None).await;
    let branch = seed_branch(&state).await;
    let staff_auth = bearer(&state, &staff);
    let manager_auth = bearer(&state, &manager);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(staff_auth.clone())
        .set_json(student_body(&branch.id, "Kiran"))
        .to_request();
    let (_, student) = send!(&app, req);
    let uri = format!("/api/students/{}", student["id"].as_str().unwrap());

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(staff_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(staff_auth.clone())
        .set_json(json!({"isActive": false}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    // Ordinary edits stay open to staff
    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(staff_auth.clone())
        .set_json(json!({"name": "Kiran R"}))
        .to_request();
    let (status, updated) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Kiran R");
    assert_eq!(updated["isActive"], true);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(manager_auth)
        .set_json(json!({"isActive": false}))
        .to_request();
    let (status, updated) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["isActive"], false);
}

#[actix_web::test]
async fn test_revoked_accounts_lose_access_immediately() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let manager = seed_user(&state, "manager", None).await;
    let other = seed_user(&state, "admin", None).await;
    let admin_auth = bearer(&state, &admin);
    let manager_auth = bearer(&state, &manager);
    let other_auth = bearer(&state, &other);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get()
        .uri("/api/reports/profit-loss")
        .insert_header(manager_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}", manager.id))
        .insert_header(admin_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    // The token is still validly signed but the account is gone
    let req = test::TestRequest::get()
        .uri("/api/reports/profit-loss")
        .insert_header(manager_auth)
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    // A demotion takes effect without a new login
    let req = test::TestRequest::put()
        .uri(&format!("/api/users/{}", other.id))
        .insert_header(admin_auth)
        .set_json(json!({"role": "staff"}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/users")
        .insert_header(other_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(other_auth)
        .to_request();
    let (status, me) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "staff");
}

#[actix_web::test]
async fn test_out_of_service_seat_cannot_be_allocated() {
    let state = test_state().await;
    let manager = seed_user(&state, "manager", None).await;
    let staff = seed_user(&state, "staff", None).await;
    let branch = seed_branch(&state).await;
    let shift = seed_shift(&state, &branch.id, "Morning", 2000).await;
    let seat = seed_seat(&state, &branch.id, "C3").await;
    let manager_auth = bearer(&state, &manager);
    let staff_auth = bearer(&state, &staff);
    let app = test::init_service(create_app(state)).await;
    let seat_uri = format!("/api/seats/{}", seat.id);

    let req = test::TestRequest::put()
        .uri(&seat_uri)
        .insert_header(staff_auth.clone())
        .set_json(json!({"isActive": false}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::put()
        .uri(&seat_uri)
        .insert_header(manager_auth.clone())
        .set_json(json!({"isActive": false}))
        .to_request();
    let (status, updated) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["isActive"], false);

    let mut body = student_body(&branch.id, "Lata");
    body["seatId"] = json!(seat.id);
    body["shiftId"] = json!(shift.id);
    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(staff_auth.clone())
        .set_json(&body)
        .to_request();
    let (status, problem) = send!(&app, req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["detail"], "Seat is not in service");

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/seats/availability?branchId={}&shiftId={}",
            branch.id, shift.id
        ))
        .insert_header(staff_auth.clone())
        .to_request();
    let (_, seats) = send!(&app, req);
    assert!(seats.as_array().unwrap().is_empty());

    // Back in service, allocated, then it cannot be retired while held
    let req = test::TestRequest::put()
        .uri(&seat_uri)
        .insert_header(manager_auth.clone())
        .set_json(json!({"isActive": true, "label": "C3-window"}))
        .to_request();
    let (status, updated) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["label"], "C3-window");

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(staff_auth)
        .set_json(&body)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CREATED);

    let req = test::TestRequest::put()
        .uri(&seat_uri)
        .insert_header(manager_auth)
        .set_json(json!({"isActive": false}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_referenced_branch_cannot_be_deleted() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let used = seed_branch(&state).await;
    let empty = seed_branch(&state).await;
    seed_shift(&state, &used.id, "Morning", 1000).await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::delete()
        .uri(&format!("/api/branches/{}", used.id))
        .insert_header(auth.clone())
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["title"], "Conflict");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/branches/{}", empty.id))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/branches/{}", empty.id))
        .insert_header(auth)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_unknown_api_route_needs_session_then_404() {
    let state = test_state().await;
    let staff = seed_user(&state, "staff", None).await;
    let auth = bearer(&state, &staff);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get().uri("/api/no-such-thing").to_request();
    assert_eq!(send!(&app, req).0, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/no-such-thing")
        .insert_header(auth)
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[actix_web::test]
async fn test_only_admin_deletes_collections() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let manager = seed_user(&state, "manager", None).await;
    let staff = seed_user(&state, "staff", None).await;
    let branch = seed_branch(&state).await;
    let admin_auth = bearer(&state, &admin);
    let manager_auth = bearer(&state, &manager);
    let staff_auth = bearer(&state, &staff);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/students")
        .insert_header(staff_auth.clone())
        .set_json(student_body(&branch.id, "Meena"))
        .to_request();
    let (_, student) = send!(&app, req);
    let ledger_uri = format!("/api/students/{}/transactions", student["id"].as_str().unwrap());

    for amount in [1000, 2000] {
        let req = test::TestRequest::post()
            .uri("/api/transactions")
            .insert_header(staff_auth.clone())
            .set_json(json!({
                "studentId": student["id"],
                "amount": amount,
                "paymentMode": "cash",
                "forMonth": TEST_MONTH,
                "paidOn": TEST_DATE,
            }))
            .to_request();
        assert_eq!(send!(&app, req).0, StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri(&ledger_uri)
        .insert_header(staff_auth.clone())
        .to_request();
    let (status, ledger) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    let ledger = ledger.as_array().unwrap().clone();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|row| row["studentId"] == student["id"]));
    let doomed = format!("/api/transactions/{}", ledger[0]["id"].as_str().unwrap());

    for auth in [staff_auth.clone(), manager_auth] {
        let req = test::TestRequest::delete()
            .uri(&doomed)
            .insert_header(auth)
            .to_request();
        assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);
    }

    let req = test::TestRequest::delete()
        .uri(&doomed)
        .insert_header(admin_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    let req = test::TestRequest::delete()
        .uri(&doomed)
        .insert_header(admin_auth)
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&ledger_uri)
        .insert_header(staff_auth)
        .to_request();
    let (_, ledger) = send!(&app, req);
    assert_eq!(ledger.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_shift_seat_and_expense_maintenance() {
    let state = test_state().await;
    let manager = seed_user(&state, "manager", None).await;
    let staff = seed_user(&state, "staff", None).await;
    let branch = seed_branch(&state).await;
    let shift = seed_shift(&state, &branch.id, "Morning", 1500).await;
    let seat = seed_seat(&state, &branch.id, "D4").await;
    let auth = bearer(&state, &manager);
    let staff_auth = bearer(&state, &staff);
    let app = test::init_service(create_app(state)).await;
    let shift_uri = format!("/api/shifts/{}", shift.id);

    let req = test::TestRequest::put()
        .uri(&shift_uri)
        .insert_header(auth.clone())
        .set_json(json!({"monthlyFee": 1800, "endTime": "13:00"}))
        .to_request();
    let (status, updated) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["monthlyFee"], 1800);
    assert_eq!(updated["endTime"], "13:00");
    assert_eq!(updated["startTime"], "06:00");

    // The merged window must still run forwards
    let req = test::TestRequest::put()
        .uri(&shift_uri)
        .insert_header(auth.clone())
        .set_json(json!({"endTime": "05:00"}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete()
        .uri(&shift_uri)
        .insert_header(staff_auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&shift_uri)
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/seats/{}", seat.id))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/seats?branchId={}", branch.id))
        .insert_header(auth.clone())
        .to_request();
    let (_, seats) = send!(&app, req);
    assert!(seats.as_array().unwrap().is_empty());

    let req = test::TestRequest::post()
        .uri("/api/expenses")
        .insert_header(auth.clone())
        .set_json(json!({
            "branchId": branch.id,
            "category": "rent",
            "amount": 9000,
            "spentOn": TEST_DATE,
        }))
        .to_request();
    let (status, expense) = send!(&app, req);
    assert_eq!(status, StatusCode::CREATED);
    let expense_uri = format!("/api/expenses/{}", expense["id"].as_str().unwrap());

    let req = test::TestRequest::put()
        .uri(&expense_uri)
        .insert_header(auth.clone())
        .set_json(json!({"amount": 9500, "description": "March rent"}))
        .to_request();
    let (status, updated) = send!(&app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["amount"], 9500);
    assert_eq!(updated["description"], "March rent");
    assert_eq!(updated["category"], "rent");

    let req = test::TestRequest::put()
        .uri(&expense_uri)
        .insert_header(staff_auth)
        .set_json(json!({"amount": 1}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&expense_uri)
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/expenses?branchId={}", branch.id))
        .insert_header(auth)
        .to_request();
    let (_, expenses) = send!(&app, req);
    assert!(expenses.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_setup_stays_closed_when_every_account_is_disabled() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    UserRepository::new(state.db.pool())
        .deactivate(&admin.id)
        .await
        .expect("deactivate");
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get().uri("/api/auth/setup/needed").to_request();
    let (_, body) = send!(&app, req);
    assert_eq!(body["needsSetup"], false);

    let req = test::TestRequest::post()
        .uri("/api/auth/setup/signup")
        .set_json(json!({"username": "intruder", "email": "intruder@example.com", "password": "long_enough_pw"}))
        .to_request();
    assert_eq!(send!(&app, req).0, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_duplicate_username_is_conflict() {
    let state = test_state().await;
    let admin = seed_user(&state, "admin", None).await;
    let auth = bearer(&state, &admin);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::post()
        .uri("/api/users")
        .insert_header(auth)
        .set_json(json!({
            "username": admin.username,
            "email": "fresh@example.com",
            "password": "long_enough_pw",
            "role": "staff",
        }))
        .to_request();
    let (status, body) = send!(&app, req);
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Username is already taken");
}
