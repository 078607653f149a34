//! ABOUTME: Branch endpoints; reads are open to staff, changes are admin only
//! ABOUTME: Branch-bound users only ever see their own branch

use crate::{
    error::ApiResult,
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{CreateBranchBody, UpdateBranchBody},
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sd_db::{BranchRepository, CreateBranchRequest, UpdateBranchRequest};
use tracing::info;
use validator::Validate;

#[utoipa::path(
    get,
    path = "/api/branches",
    tag = "branches",
    responses((status = 200, description = "Branches visible to the caller"))
)]
#[get("/branches", wrap = "RequireRole::staff()")]
pub async fn list_branches(state: web::Data<AppState>, user: AuthUser) -> ApiResult<HttpResponse> {
    let mut branches = BranchRepository::new(state.db.pool()).list().await?;
    if !user.is_admin() {
        if let Some(own) = &user.branch_id {
            branches.retain(|branch| &branch.id == own);
        }
    }
    Ok(HttpResponse::Ok().json(branches))
}

#[utoipa::path(
    get,
    path = "/api/branches/{id}",
    tag = "branches",
    params(("id" = String, Path, description = "Branch id")),
    responses(
        (status = 200, description = "Branch"),
        (status = 403, description = "Another branch"),
        (status = 404, description = "Unknown branch"),
    )
)]
#[get("/branches/{id}", wrap = "RequireRole::staff()")]
pub async fn get_branch(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    user.ensure_branch(&id)?;

    let branch = BranchRepository::new(state.db.pool())
        .find_by_id(&id)
        .await?
        .ok_or_else(|| sd_core::Error::NotFound("Branch not found".to_string()))?;
    Ok(HttpResponse::Ok().json(branch))
}

#[utoipa::path(
    post,
    path = "/api/branches",
    tag = "branches",
    request_body = CreateBranchBody,
    responses(
        (status = 201, description = "Branch created"),
        (status = 409, description = "Name already used"),
    )
)]
#[post("/branches", wrap = "RequireRole::admin()")]
pub async fn create_branch(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateBranchBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();

    let branch = BranchRepository::new(state.db.pool())
        .create(CreateBranchRequest {
            name: body.name,
            address: body.address,
            phone: body.phone,
        })
        .await?;

    info!(branch_id = %branch.id, by = %user.id, "Branch created");
    Ok(HttpResponse::Created().json(branch))
}

#[utoipa::path(
    put,
    path = "/api/branches/{id}",
    tag = "branches",
    request_body = UpdateBranchBody,
    params(("id" = String, Path, description = "Branch id")),
    responses(
        (status = 200, description = "Branch updated"),
        (status = 404, description = "Unknown branch"),
    )
)]
#[put("/branches/{id}", wrap = "RequireRole::admin()")]
pub async fn update_branch(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateBranchBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();

    let branch = BranchRepository::new(state.db.pool())
        .update(
            &path.into_inner(),
            UpdateBranchRequest {
                name: body.name,
                address: body.address,
                phone: body.phone,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(branch))
}

#[utoipa::path(
    delete,
    path = "/api/branches/{id}",
    tag = "branches",
    params(("id" = String, Path, description = "Branch id")),
    responses(
        (status = 204, description = "Branch deleted"),
        (status = 404, description = "Unknown branch"),
        (status = 409, description = "Branch still has records"),
    )
)]
#[delete("/branches/{id}", wrap = "RequireRole::admin()")]
pub async fn delete_branch(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    BranchRepository::new(state.db.pool()).delete(&id).await?;

    info!(branch_id = %id, by = %user.id, "Branch deleted");
    Ok(HttpResponse::NoContent().finish())
}
