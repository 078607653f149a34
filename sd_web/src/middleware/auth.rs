//! ABOUTME: Authentication middleware for session token verification
//! ABOUTME: Reads a Bearer header or the session cookie and attaches the caller to the request

use super::reject;
use crate::{auth::SESSION_COOKIE, error::ApiError, models::Role, AppState};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use sd_db::{User, UserRepository};
use std::rc::Rc;
use tracing::{debug, warn};

/// Authentication middleware that requires a valid session
pub struct RequireAuth;

impl RequireAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequireAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let bearer = req
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::to_string);
            let via_header = bearer.is_some();

            let Some(token) = bearer.or_else(|| {
                req.cookie(SESSION_COOKIE)
                    .map(|cookie| cookie.value().to_string())
                    .filter(|value| !value.is_empty())
            }) else {
                return Ok(reject(req, ApiError::unauthorized("Authentication required")));
            };

            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                return Ok(reject(req, ApiError::internal_server_error("Application state missing")));
            };

            let claims = match state.tokens.verify(&token) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!("Session verification failed: {}", e);
                    return Ok(reject(req, ApiError::unauthorized("Invalid or expired session")));
                }
            };

            // Role and branch come from the stored account so revocations apply immediately
            let account = match UserRepository::new(state.db.pool())
                .find_by_id(&claims.sub)
                .await
            {
                Ok(Some(account)) if account.is_active => account,
                Ok(_) => {
                    warn!(user_id = %claims.sub, "Session for missing or disabled account");
                    return Ok(reject(
                        req,
                        ApiError::unauthorized("Account no longer exists or is disabled"),
                    ));
                }
                Err(e) => return Ok(reject(req, ApiError::from(e))),
            };

            let auth_user = match AuthUser::from_account(&account) {
                Some(user) => user,
                None => return Ok(reject(req, ApiError::unauthorized("Invalid account role"))),
            };

            debug!(
                "Authenticated user {} (via {})",
                auth_user.id,
                if via_header { "header" } else { "cookie" }
            );
            req.extensions_mut().insert(auth_user);
            Ok(service.call(req).await?.map_into_left_body())
        })
    }
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub branch_id: Option<String>,
}

impl AuthUser {
    fn from_account(account: &User) -> Option<Self> {
        let role = account.role.parse().ok()?;
        Some(Self {
            id: account.id.clone(),
            email: account.email.clone(),
            role,
            branch_id: account.branch_id.clone(),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Resolve which branch a listing or report may cover.
    ///
    /// Admins and users without a home branch see what they ask for. Branch
    /// bound users are pinned to their own branch and asking for another one
    /// is forbidden.
    pub fn scope_branch(&self, requested: Option<String>) -> Result<Option<String>, ApiError> {
        if self.is_admin() {
            return Ok(requested);
        }

        match (&self.branch_id, requested) {
            (Some(own), Some(requested)) if *own != requested => {
                Err(ApiError::forbidden("Access to this branch is not permitted"))
            }
            (Some(own), _) => Ok(Some(own.clone())),
            (None, requested) => Ok(requested),
        }
    }

    /// Row-level check that a record in `branch_id` is visible to the caller
    pub fn ensure_branch(&self, branch_id: &str) -> Result<(), ApiError> {
        match &self.branch_id {
            Some(own) if !self.is_admin() && own != branch_id => {
                Err(ApiError::forbidden("Access to this branch is not permitted"))
            }
            _ => Ok(()),
        }
    }
}

impl FromRequest for AuthUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            get_http_auth_user(req)
                .ok_or_else(|| ApiError::unauthorized("Authentication required").into()),
        )
    }
}

/// Helper function to extract authenticated user from HTTP request
pub fn get_http_auth_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}
