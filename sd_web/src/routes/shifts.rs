//! ABOUTME: Shift endpoints; daily time slots with a default monthly fee
//! ABOUTME: Start must precede end; both are HH:MM wall-clock times

use crate::{
    error::{ApiError, ApiResult},
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{BranchQuery, CreateShiftBody, UpdateShiftBody},
    routes::referenced_branch,
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sd_core::{time::parse_hhmm, Error};
use sd_db::{CreateShiftRequest, ShiftRepository, UpdateShiftRequest};
use tracing::info;
use validator::Validate;

fn check_window(start: &str, end: &str) -> ApiResult<()> {
    if parse_hhmm(start)? >= parse_hhmm(end)? {
        return Err(ApiError::bad_request("Shift start time must be before its end time"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/shifts",
    tag = "shifts",
    params(BranchQuery),
    responses((status = 200, description = "Shifts"))
)]
#[get("/shifts", wrap = "RequireRole::staff()")]
pub async fn list_shifts(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<BranchQuery>,
) -> ApiResult<HttpResponse> {
    let branch_id = user.scope_branch(query.into_inner().branch_id)?;
    let shifts = ShiftRepository::new(state.db.pool())
        .list(branch_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(shifts))
}

#[utoipa::path(
    post,
    path = "/api/shifts",
    tag = "shifts",
    request_body = CreateShiftBody,
    responses(
        (status = 201, description = "Shift created"),
        (status = 400, description = "Invalid times or unknown branch"),
        (status = 409, description = "Name already used in the branch"),
    )
)]
#[post("/shifts", wrap = "RequireRole::manager()")]
pub async fn create_shift(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateShiftBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    user.ensure_branch(&body.branch_id)?;
    check_window(&body.start_time, &body.end_time)?;
    referenced_branch(&state.db, &body.branch_id).await?;

    let shift = ShiftRepository::new(state.db.pool())
        .create(CreateShiftRequest {
            branch_id: body.branch_id,
            name: body.name,
            start_time: body.start_time,
            end_time: body.end_time,
            monthly_fee: body.monthly_fee,
        })
        .await?;

    info!(shift_id = %shift.id, branch_id = %shift.branch_id, "Shift created");
    Ok(HttpResponse::Created().json(shift))
}

#[utoipa::path(
    put,
    path = "/api/shifts/{id}",
    tag = "shifts",
    request_body = UpdateShiftBody,
    params(("id" = String, Path, description = "Shift id")),
    responses(
        (status = 200, description = "Shift updated"),
        (status = 404, description = "Unknown shift"),
    )
)]
#[put("/shifts/{id}", wrap = "RequireRole::manager()")]
pub async fn update_shift(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateShiftBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    let id = path.into_inner();

    let repo = ShiftRepository::new(state.db.pool());
    let existing = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::NotFound("Shift not found".to_string()))?;
    user.ensure_branch(&existing.branch_id)?;

    check_window(
        body.start_time.as_deref().unwrap_or(&existing.start_time),
        body.end_time.as_deref().unwrap_or(&existing.end_time),
    )?;

    let shift = repo
        .update(
            &id,
            UpdateShiftRequest {
                name: body.name,
                start_time: body.start_time,
                end_time: body.end_time,
                monthly_fee: body.monthly_fee,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(shift))
}

#[utoipa::path(
    delete,
    path = "/api/shifts/{id}",
    tag = "shifts",
    params(("id" = String, Path, description = "Shift id")),
    responses(
        (status = 204, description = "Shift deleted"),
        (status = 409, description = "Shift is referenced by students"),
    )
)]
#[delete("/shifts/{id}", wrap = "RequireRole::manager()")]
pub async fn delete_shift(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let repo = ShiftRepository::new(state.db.pool());
    let existing = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::NotFound("Shift not found".to_string()))?;
    user.ensure_branch(&existing.branch_id)?;

    repo.delete(&id).await?;
    info!(shift_id = %id, by = %user.id, "Shift deleted");
    Ok(HttpResponse::NoContent().finish())
}
