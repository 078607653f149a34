//! ABOUTME: Back-office account management for administrators
//! ABOUTME: Deleting an account deactivates it; admins cannot disable or demote themselves

use crate::{
    auth::PasswordAuth,
    error::{ApiError, ApiResult},
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{CreateUserBody, Role, UpdateUserBody, UserInfo},
    routes::referenced_branch,
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sd_db::{CreateUserRequest, UpdateUserRequest, UserRepository};
use tracing::{info, warn};
use validator::Validate;

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    responses((status = 200, description = "All accounts", body = [UserInfo]))
)]
#[get("/users", wrap = "RequireRole::admin()")]
pub async fn list_users(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let users: Vec<UserInfo> = UserRepository::new(state.db.pool())
        .list()
        .await?
        .into_iter()
        .map(UserInfo::from)
        .collect();
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUserBody,
    responses(
        (status = 201, description = "Account created", body = UserInfo),
        (status = 409, description = "Username or email already used"),
    )
)]
#[post("/users", wrap = "RequireRole::admin()")]
pub async fn create_user(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateUserBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    if let Some(branch_id) = &body.branch_id {
        referenced_branch(&state.db, branch_id).await?;
    }

    let repo = UserRepository::new(state.db.pool());
    if repo.find_by_username(&body.username).await?.is_some() {
        return Err(ApiError::conflict("Username is already taken"));
    }
    if repo.find_by_email(&body.email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let created = repo
        .create(CreateUserRequest {
            username: body.username,
            email: body.email,
            password_hash: PasswordAuth::hash_password(&body.password)?,
            role: body.role.as_str().to_string(),
            branch_id: body.branch_id,
        })
        .await?;

    info!(user_id = %created.id, role = %created.role, by = %user.id, "User created");
    Ok(HttpResponse::Created().json(UserInfo::from(created)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "users",
    request_body = UpdateUserBody,
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Account updated", body = UserInfo),
        (status = 400, description = "Invalid change to own account"),
        (status = 404, description = "Unknown user"),
    )
)]
#[put("/users/{id}", wrap = "RequireRole::admin()")]
pub async fn update_user(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateUserBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    let id = path.into_inner();

    if id == user.id {
        if body.is_active == Some(false) {
            return Err(ApiError::bad_request("You cannot deactivate your own account"));
        }
        if body.role.is_some_and(|role| role != Role::Admin) {
            return Err(ApiError::bad_request("You cannot remove your own admin role"));
        }
    }
    if let Some(Some(branch_id)) = &body.branch_id {
        referenced_branch(&state.db, branch_id).await?;
    }

    let password_hash = body
        .password
        .as_deref()
        .map(PasswordAuth::hash_password)
        .transpose()?;

    let updated = UserRepository::new(state.db.pool())
        .update(
            &id,
            UpdateUserRequest {
                username: body.username,
                email: body.email,
                password_hash,
                role: body.role.map(|role| role.as_str().to_string()),
                branch_id: body.branch_id,
                is_active: body.is_active,
            },
        )
        .await?;

    info!(user_id = %updated.id, by = %user.id, "User updated");
    Ok(HttpResponse::Ok().json(UserInfo::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 400, description = "Own account"),
        (status = 404, description = "Unknown user"),
    )
)]
#[delete("/users/{id}", wrap = "RequireRole::admin()")]
pub async fn delete_user(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    if id == user.id {
        warn!(user_id = %id, "Attempt to deactivate own account");
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    UserRepository::new(state.db.pool()).deactivate(&id).await?;
    info!(user_id = %id, by = %user.id, "User deactivated");
    Ok(HttpResponse::NoContent().finish())
}
