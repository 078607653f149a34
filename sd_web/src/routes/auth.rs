//! ABOUTME: Authentication endpoints for login, logout and first-run setup
//! ABOUTME: Issues session tokens in the response body and an HTTP-only cookie

use crate::{
    auth::{PasswordAuth, SessionTokens},
    error::{ApiError, ApiResult},
    models::{LoginRequest, LoginResponse, Role, SetupStatus, SignupRequest, UserInfo},
    AppState,
};
use actix_web::{get, http::StatusCode, post, web, HttpResponse, HttpResponseBuilder};
use sd_db::{CreateUserRequest, User, UserRepository};
use sd_obs::LoginOutcome;
use tracing::{debug, info, warn};
use validator::Validate;

/// Token body plus session cookie for a freshly authenticated user
fn session_response(state: &AppState, user: User, status: StatusCode) -> ApiResult<HttpResponse> {
    let token = state.tokens.issue(&user)?;
    let cookie = state
        .tokens
        .cookie(token.clone(), state.security.secure_cookies);

    Ok(HttpResponseBuilder::new(status)
        .cookie(cookie)
        .json(LoginResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: state.tokens.ttl_secs(),
            user: UserInfo::from(user),
        }))
}

/// User login endpoint
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts"),
    )
)]
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    debug!("Login attempt for email: {}", payload.email);
    payload.validate()?;

    let user_repo = UserRepository::new(state.db.pool());
    let user = match user_repo.find_by_email(&payload.email).await? {
        Some(user) => user,
        None => {
            warn!("Login attempt for non-existent email: {}", payload.email);
            state.metrics.record_login(LoginOutcome::Failure);
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    if !PasswordAuth::verify_password(&payload.password, &user.password_hash)? {
        warn!("Invalid password for user: {}", user.id);
        state.metrics.record_login(LoginOutcome::Failure);
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    if !user.is_active {
        warn!("Login attempt for inactive user: {}", user.id);
        state.metrics.record_login(LoginOutcome::Failure);
        return Err(ApiError::unauthorized("Account is disabled"));
    }

    state.metrics.record_login(LoginOutcome::Success);
    info!(user_id = %user.id, role = %user.role, "User logged in");
    session_response(&state, user, StatusCode::OK)
}

/// Clear the session cookie
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Session cleared"))
)]
#[post("/logout")]
pub async fn logout(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::NoContent()
        .cookie(SessionTokens::removal_cookie(state.security.secure_cookies))
        .finish()
}

/// Whether the first administrator still has to be created
#[utoipa::path(
    get,
    path = "/api/auth/setup/needed",
    tag = "auth",
    responses((status = 200, description = "Setup status", body = SetupStatus))
)]
#[get("/setup/needed")]
pub async fn setup_needed(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let has_users = UserRepository::new(state.db.pool()).has_any_users().await?;
    Ok(HttpResponse::Ok().json(SetupStatus {
        needs_setup: !has_users,
    }))
}

/// Create the first administrator and sign them in
#[utoipa::path(
    post,
    path = "/api/auth/setup/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Administrator created", body = LoginResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Setup already completed"),
    )
)]
#[post("/setup/signup")]
pub async fn setup_signup(
    state: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let user_repo = UserRepository::new(state.db.pool());
    if user_repo.has_any_users().await? {
        warn!("Setup signup attempted after setup was completed");
        return Err(ApiError::conflict("Setup has already been completed"));
    }

    let payload = payload.into_inner();
    let user = user_repo
        .create(CreateUserRequest {
            username: payload.username,
            email: payload.email,
            password_hash: PasswordAuth::hash_password(&payload.password)?,
            role: Role::Admin.as_str().to_string(),
            branch_id: None,
        })
        .await?;

    info!(user_id = %user.id, "First administrator created");
    session_response(&state, user, StatusCode::CREATED)
}
