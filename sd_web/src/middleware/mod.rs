//! ABOUTME: Middleware for session authentication, role checks, rate limiting and metrics
//! ABOUTME: Rejections are rendered in place as problem+json responses

pub mod auth;
pub mod metrics;
pub mod ratelimit;
pub mod rbac;

use crate::error::ApiError;
use actix_web::{
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
};

/// Short-circuit a request with a problem+json response
pub(crate) fn reject<B>(req: ServiceRequest, error: ApiError) -> ServiceResponse<EitherBody<B>> {
    req.error_response(error).map_into_right_body()
}
