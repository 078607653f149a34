//! ABOUTME: Every API failure leaves as an RFC 7807 problem+json body
//! ABOUTME: Maps core, validation and JSON extraction errors onto HTTP statuses

use crate::models::{ProblemDetails, ValidationError};
use actix_web::{
    error::{JsonPayloadError, QueryPayloadError},
    http::StatusCode,
    HttpRequest, HttpResponse, ResponseError,
};
use sd_core::Error;
use std::fmt;
use tracing::error;
use validator::ValidationErrors;

/// API error wrapper for RFC 7807 Problem Details
#[derive(Debug)]
pub struct ApiError {
    pub problem: ProblemDetails,
    pub status_code: u16,
}

impl ApiError {
    pub fn new(problem: ProblemDetails) -> Self {
        let status_code = problem.status.unwrap_or(500);
        Self {
            problem,
            status_code,
        }
    }

    /// Create a validation error from validator::ValidationErrors
    pub fn validation(errors: ValidationErrors) -> Self {
        let validation_errors: Vec<ValidationError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |error| ValidationError {
                    field: field.to_string(),
                    code: error.code.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for field '{}'", field)),
                })
            })
            .collect();

        let problem = ProblemDetails::validation_error("Request validation failed").with_extension(
            "errors",
            serde_json::to_value(validation_errors).unwrap_or_default(),
        );

        Self::new(problem)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ProblemDetails::validation_error(detail.into()))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7235.html#section-3.1",
                "Unauthorized",
            )
            .with_status(401)
            .with_detail(detail.into()),
        )
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.3",
                "Forbidden",
            )
            .with_status(403)
            .with_detail(detail.into()),
        )
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.4",
                "Not Found",
            )
            .with_status(404)
            .with_detail(detail.into()),
        )
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.8",
                "Conflict",
            )
            .with_status(409)
            .with_detail(detail.into()),
        )
    }

    /// The detail is logged, never sent to the client
    pub fn internal_server_error(detail: impl Into<String>) -> Self {
        error!("Internal error: {}", detail.into());
        Self::new(
            ProblemDetails::new(
                "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.6.1",
                "Internal Server Error",
            )
            .with_status(500)
            .with_detail("An internal error occurred"),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.problem.title,
            self.problem.detail.as_deref().unwrap_or("No details available")
        )
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/problem+json")
            .json(&self.problem)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Validation(msg) => Self::bad_request(msg),
            Error::Conflict(msg) => Self::conflict(msg),
            Error::Unauthorized(msg) => Self::unauthorized(msg),
            Error::Database(msg) => Self::internal_server_error(format!("Database error: {}", msg)),
            Error::Config(msg) => {
                Self::internal_server_error(format!("Configuration error: {}", msg))
            }
            Error::Io(e) => Self::internal_server_error(format!("IO error: {}", e)),
        }
    }
}

/// Turns JSON body extraction failures into 400 problem responses
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let detail = match &err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            "Request body is too large".to_string()
        }
        JsonPayloadError::ContentType => "Expected an application/json body".to_string(),
        other => format!("Invalid JSON body: {}", other),
    };
    ApiError::bad_request(detail).into()
}

/// Turns malformed query strings into 400 problem responses
pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request(format!("Invalid query string: {}", err)).into()
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
