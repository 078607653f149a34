//! ABOUTME: Admin-only maintenance endpoints
//! ABOUTME: Table row counts for a quick health overview of the data

use crate::{error::ApiResult, middleware::rbac::RequireRole, AppState};
use actix_web::{get, web, HttpResponse};

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "admin",
    responses((status = 200, description = "Row count per table"))
)]
#[get("/admin/stats", wrap = "RequireRole::admin()")]
pub async fn stats(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let stats = state.db.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}
