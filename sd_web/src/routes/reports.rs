//! ABOUTME: Report endpoints for profit/loss, dues and the dashboard summary
//! ABOUTME: The month defaults to the current one; branch scoping follows the caller

use crate::{
    error::ApiResult,
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::ReportQuery,
    routes::report_month,
    AppState,
};
use actix_web::{get, web, HttpResponse};
use sd_db::ReportRepository;
use tracing::debug;

#[utoipa::path(
    get,
    path = "/api/reports/profit-loss",
    tag = "reports",
    params(ReportQuery),
    responses(
        (status = 200, description = "Cash-basis profit and loss"),
        (status = 400, description = "Malformed month"),
    )
)]
#[get("/reports/profit-loss", wrap = "RequireRole::manager()")]
pub async fn profit_loss(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let month = report_month(query.month)?;
    let branch_id = user.scope_branch(query.branch_id)?;
    debug!(%month, ?branch_id, "Profit/loss requested");

    let report = ReportRepository::new(state.db.pool())
        .profit_loss(&month, branch_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/dues",
    tag = "reports",
    params(ReportQuery),
    responses((status = 200, description = "Students with an outstanding balance"))
)]
#[get("/reports/dues", wrap = "RequireRole::staff()")]
pub async fn dues(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let month = report_month(query.month)?;
    let branch_id = user.scope_branch(query.branch_id)?;

    let report = ReportRepository::new(state.db.pool())
        .dues(&month, branch_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/summary",
    tag = "reports",
    params(ReportQuery),
    responses((status = 200, description = "Dashboard headline numbers"))
)]
#[get("/reports/summary", wrap = "RequireRole::staff()")]
pub async fn summary(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let month = report_month(query.month)?;
    let branch_id = user.scope_branch(query.branch_id)?;

    let report = ReportRepository::new(state.db.pool())
        .summary(&month, branch_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(report))
}
