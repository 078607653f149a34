//! ABOUTME: Per-route role gate for admin, manager and staff accounts
//! ABOUTME: Staff < manager < admin; each route names the lowest role it accepts

use super::reject;
use crate::{error::ApiError, middleware::auth::AuthUser, models::Role};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

/// Rejects requests whose session role ranks below `minimum`
pub struct RequireRole {
    minimum: Role,
}

impl RequireRole {
    pub fn at_least(minimum: Role) -> Self {
        Self { minimum }
    }

    pub fn admin() -> Self {
        Self::at_least(Role::Admin)
    }

    /// Managers and admins
    pub fn manager() -> Self {
        Self::at_least(Role::Manager)
    }

    /// Any signed-in role
    pub fn staff() -> Self {
        Self::at_least(Role::Staff)
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleMiddleware {
            service: Rc::new(service),
            minimum: self.minimum,
        }))
    }
}

pub struct RequireRoleMiddleware<S> {
    service: Rc<S>,
    minimum: Role,
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
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
        let minimum = self.minimum;

        Box::pin(async move {
            // Scope the extensions borrow before handing the request on
            let auth_user = {
                let extensions = req.extensions();
                extensions.get::<AuthUser>().cloned()
            };

            let Some(auth_user) = auth_user else {
                warn!("RBAC middleware called without authenticated user");
                return Ok(reject(req, ApiError::unauthorized("Authentication required")));
            };

            if auth_user.role.at_least(minimum) {
                debug!(user_id = %auth_user.id, role = %auth_user.role, "Role check passed");
                Ok(service.call(req).await?.map_into_left_body())
            } else {
                warn!(
                    user_id = %auth_user.id,
                    role = %auth_user.role,
                    required = %minimum,
                    path = %req.path(),
                    "Role check failed"
                );
                Ok(reject(req, ApiError::forbidden("Insufficient permissions")))
            }
        })
    }
}
