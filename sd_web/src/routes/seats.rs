//! ABOUTME: Seat endpoints including per-shift availability
//! ABOUTME: A seat can be held by one active student per shift

use crate::{
    error::{ApiError, ApiResult},
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{AvailabilityQuery, BranchQuery, CreateSeatBody, UpdateSeatBody},
    routes::referenced_branch,
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sd_core::Error;
use sd_db::{CreateSeatRequest, SeatRepository, ShiftRepository, UpdateSeatRequest};
use tracing::info;
use validator::Validate;

#[utoipa::path(
    get,
    path = "/api/seats",
    tag = "seats",
    params(BranchQuery),
    responses((status = 200, description = "Seats ordered by label"))
)]
#[get("/seats", wrap = "RequireRole::staff()")]
pub async fn list_seats(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<BranchQuery>,
) -> ApiResult<HttpResponse> {
    let branch_id = user.scope_branch(query.into_inner().branch_id)?;
    let seats = SeatRepository::new(state.db.pool())
        .list(branch_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(seats))
}

#[utoipa::path(
    get,
    path = "/api/seats/availability",
    tag = "seats",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Every active seat with its occupant for the shift"),
        (status = 404, description = "Shift not found in the branch"),
    )
)]
#[get("/seats/availability", wrap = "RequireRole::staff()")]
pub async fn seat_availability(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<AvailabilityQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    user.ensure_branch(&query.branch_id)?;

    let shift = ShiftRepository::new(state.db.pool())
        .find_by_id(&query.shift_id)
        .await?
        .filter(|shift| shift.branch_id == query.branch_id)
        .ok_or_else(|| ApiError::not_found("Shift not found in this branch"))?;

    let seats = SeatRepository::new(state.db.pool())
        .availability(&query.branch_id, &shift.id)
        .await?;
    Ok(HttpResponse::Ok().json(seats))
}

#[utoipa::path(
    post,
    path = "/api/seats",
    tag = "seats",
    request_body = CreateSeatBody,
    responses(
        (status = 201, description = "Seat created"),
        (status = 409, description = "Label already used in the branch"),
    )
)]
#[post("/seats", wrap = "RequireRole::manager()")]
pub async fn create_seat(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateSeatBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    user.ensure_branch(&body.branch_id)?;
    referenced_branch(&state.db, &body.branch_id).await?;

    let seat = SeatRepository::new(state.db.pool())
        .create(CreateSeatRequest {
            branch_id: body.branch_id,
            label: body.label,
        })
        .await?;

    info!(seat_id = %seat.id, label = %seat.label, "Seat created");
    Ok(HttpResponse::Created().json(seat))
}

#[utoipa::path(
    put,
    path = "/api/seats/{id}",
    tag = "seats",
    request_body = UpdateSeatBody,
    params(("id" = String, Path, description = "Seat id")),
    responses(
        (status = 200, description = "Seat updated"),
        (status = 404, description = "Unknown seat"),
        (status = 409, description = "Label taken, or seat still held by an active student"),
    )
)]
#[put("/seats/{id}", wrap = "RequireRole::manager()")]
pub async fn update_seat(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateSeatBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    let id = path.into_inner();
    let repo = SeatRepository::new(state.db.pool());
    let seat = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::NotFound("Seat not found".to_string()))?;
    user.ensure_branch(&seat.branch_id)?;

    let seat = repo
        .update(
            &id,
            UpdateSeatRequest {
                label: body.label,
                is_active: body.is_active,
            },
        )
        .await?;

    info!(seat_id = %seat.id, is_active = seat.is_active, by = %user.id, "Seat updated");
    Ok(HttpResponse::Ok().json(seat))
}

#[utoipa::path(
    delete,
    path = "/api/seats/{id}",
    tag = "seats",
    params(("id" = String, Path, description = "Seat id")),
    responses(
        (status = 204, description = "Seat deleted"),
        (status = 409, description = "Seat has allocation history"),
    )
)]
#[delete("/seats/{id}", wrap = "RequireRole::manager()")]
pub async fn delete_seat(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let repo = SeatRepository::new(state.db.pool());
    let seat = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| Error::NotFound("Seat not found".to_string()))?;
    user.ensure_branch(&seat.branch_id)?;

    repo.delete(&id).await?;
    info!(seat_id = %id, by = %user.id, "Seat deleted");
    Ok(HttpResponse::NoContent().finish())
}
