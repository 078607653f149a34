//! ABOUTME: Handler groups per resource plus shared lookup helpers
//! ABOUTME: Shared lookups used by handlers that check referenced rows and report months

pub mod admin;
pub mod auth;
pub mod branches;
pub mod expenses;
pub mod public;
pub mod reports;
pub mod seats;
pub mod shifts;
pub mod static_files;
pub mod students;
pub mod transactions;
pub mod users;

use crate::error::{ApiError, ApiResult};
use sd_core::time::{current_month, validate_month};
use sd_db::{Branch, BranchRepository, Db};

/// Fetch a branch named in a request body; a missing one is a client error
pub(crate) async fn referenced_branch(db: &Db, branch_id: &str) -> ApiResult<Branch> {
    BranchRepository::new(db.pool())
        .find_by_id(branch_id)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("Branch '{}' does not exist", branch_id)))
}

/// Validated `YYYY-MM`, defaulting to the current month
pub(crate) fn report_month(month: Option<String>) -> ApiResult<String> {
    match month {
        Some(month) => Ok(validate_month(&month)?.to_string()),
        None => Ok(current_month()),
    }
}
