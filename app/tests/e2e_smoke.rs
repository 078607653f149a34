//! ABOUTME: End-to-end smoke test for the seatdesk servers
//! ABOUTME: Drives first-run setup through a collection over real HTTP with a cookie session

use actix_web::HttpServer;
use reqwest::{Client, StatusCode};
use sd_config::Config;
use sd_db::Db;
use sd_obs::{Metrics, ObsState};
use sd_web::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_support::{TEST_DATE, TEST_MONTH, TEST_SESSION_SECRET};

/// Both servers bound to ephemeral ports plus a cookie-aware client
struct E2ETestSetup {
    #[allow(dead_code)]
    temp_dir: TempDir,
    client: Client,
    web_base_url: String,
    obs_base_url: String,
}

impl E2ETestSetup {
    async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("seatdesk.db");

        let mut config = Config::default();
        config.database.path = db_path.to_string_lossy().to_string();
        config.security.session_secret = TEST_SESSION_SECRET.to_string();
        config.security.secure_cookies = false;

        let db = Db::new(&config.database.path).await?;
        let metrics = Arc::new(Metrics::new());
        let obs_state = ObsState::with_metrics(Arc::clone(&metrics));
        let app_state = AppState::new(db, &config, metrics);

        let web = HttpServer::new(move || sd_web::create_app(app_state.clone()))
            .workers(1)
            .bind("127.0.0.1:0")?;
        let web_addr = web.addrs()[0];

        let obs = HttpServer::new(move || sd_obs::create_service(obs_state.clone()))
            .workers(1)
            .bind("127.0.0.1:0")?;
        let obs_addr = obs.addrs()[0];

        actix_web::rt::spawn(web.run());
        actix_web::rt::spawn(obs.run());

        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            temp_dir,
            client,
            web_base_url: format!("http://{}", web_addr),
            obs_base_url: format!("http://{}", obs_addr),
        })
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.web_base_url, path))
            .json(&body)
            .send()
            .await
            .expect("request failed");
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.web_base_url, path))
            .send()
            .await
            .expect("request failed");
        let status = resp.status();
        (status, resp.json().await.unwrap_or(Value::Null))
    }
}

#[actix_web::test]
async fn test_first_run_to_collection() {
    let setup = E2ETestSetup::start().await.expect("servers should start");

    let (status, body) = setup.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = setup.get("/api/auth/setup/needed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needsSetup"], true);

    // Signing up stores the session cookie in the client
    let (status, _) = setup
        .post(
            "/api/auth/setup/signup",
            json!({"username": "owner", "email": "owner@example.com", "password": "long_enough_pw"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, me) = setup.get("/api/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "admin");

    let (status, branch) = setup.post("/api/branches", json!({"name": "Central"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let branch_id = branch["id"].as_str().unwrap().to_string();

    let (status, shift) = setup
        .post(
            "/api/shifts",
            json!({
                "branchId": branch_id,
                "name": "Morning",
                "startTime": "06:00",
                "endTime": "12:00",
                "monthlyFee": 2000,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, seat) = setup
        .post("/api/seats", json!({"branchId": branch_id, "label": "A1"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, student) = setup
        .post(
            "/api/students",
            json!({
                "branchId": branch_id,
                "name": "Asha",
                "phone": "9876543210",
                "seatId": seat["id"],
                "shiftId": shift["id"],
                "joiningDate": TEST_DATE,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(student["monthlyFee"], 2000);

    let (status, _) = setup
        .post(
            "/api/transactions",
            json!({
                "studentId": student["id"],
                "amount": 1500,
                "paymentMode": "cash",
                "forMonth": TEST_MONTH,
                "paidOn": TEST_DATE,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, summary) = setup
        .get(&format!(
            "/api/reports/summary?month={}&branchId={}",
            TEST_MONTH, branch_id
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["activeStudents"], 1);
    assert_eq!(summary["occupiedSeats"], 1);
    assert_eq!(summary["totalCollected"], 1500);
    assert_eq!(summary["totalDue"], 500);

    let metrics = setup
        .client
        .get(format!("{}/metrics", setup.obs_base_url))
        .send()
        .await
        .expect("metrics request failed")
        .text()
        .await
        .expect("metrics body");
    assert!(metrics.contains("collected_amount_total 1500"));

    let resp = setup
        .client
        .post(format!("{}/api/auth/logout", setup.web_base_url))
        .send()
        .await
        .expect("logout failed");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let (status, _) = setup.get("/api/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
