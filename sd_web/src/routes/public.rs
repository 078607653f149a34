//! ABOUTME: Endpoints open to every signed-in user plus the unauthenticated health check
//! ABOUTME: Health reports database reachability; `me` echoes the session's account

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    models::UserInfo,
    AppState,
};
use actix_web::{get, web, HttpResponse};
use sd_db::UserRepository;
use serde_json::json;
use tracing::warn;

/// Get current user information
#[utoipa::path(
    get,
    path = "/api/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not signed in"),
    )
)]
#[get("/me")]
pub async fn me(state: web::Data<AppState>, user: AuthUser) -> ApiResult<HttpResponse> {
    let account = UserRepository::new(state.db.pool())
        .find_by_id(&user.id)
        .await?
        .filter(|account| account.is_active)
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists or is disabled"))?;

    Ok(HttpResponse::Ok().json(UserInfo::from(account)))
}

/// Liveness check for the API process
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "public",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Database unavailable"),
    )
)]
#[get("/api/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "database": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
        Err(e) => {
            warn!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "degraded",
                "database": "unavailable",
                "version": env!("CARGO_PKG_VERSION"),
            }))
        }
    }
}
