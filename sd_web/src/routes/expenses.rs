//! ABOUTME: Expense endpoints, restricted to managers and admins
//! ABOUTME: The recording user is taken from the session

use crate::{
    error::ApiResult,
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{CreateExpenseBody, ExpenseQuery, UpdateExpenseBody},
    routes::referenced_branch,
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sd_core::{
    time::{parse_date, validate_month},
    Error,
};
use sd_db::{CreateExpenseRequest, Db, Expense, ExpenseFilter, ExpenseRepository, UpdateExpenseRequest};
use tracing::info;
use validator::Validate;

async fn load_expense(db: &Db, user: &AuthUser, id: &str) -> ApiResult<Expense> {
    let expense = ExpenseRepository::new(db.pool())
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound("Expense not found".to_string()))?;
    user.ensure_branch(&expense.branch_id)?;
    Ok(expense)
}

#[utoipa::path(
    get,
    path = "/api/expenses",
    tag = "expenses",
    params(ExpenseQuery),
    responses((status = 200, description = "Expenses, most recent first"))
)]
#[get("/expenses", wrap = "RequireRole::manager()")]
pub async fn list_expenses(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ExpenseQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    if let Some(month) = &query.month {
        validate_month(month)?;
    }

    let filter = ExpenseFilter {
        branch_id: user.scope_branch(query.branch_id)?,
        month: query.month,
        category: query.category.map(|c| c.as_str().to_string()),
    };
    let expenses = ExpenseRepository::new(state.db.pool()).list(&filter).await?;
    Ok(HttpResponse::Ok().json(expenses))
}

#[utoipa::path(
    post,
    path = "/api/expenses",
    tag = "expenses",
    request_body = CreateExpenseBody,
    responses(
        (status = 201, description = "Expense recorded"),
        (status = 400, description = "Invalid data or unknown branch"),
    )
)]
#[post("/expenses", wrap = "RequireRole::manager()")]
pub async fn create_expense(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateExpenseBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    user.ensure_branch(&body.branch_id)?;
    parse_date(&body.spent_on)?;
    referenced_branch(&state.db, &body.branch_id).await?;

    let expense = ExpenseRepository::new(state.db.pool())
        .create(CreateExpenseRequest {
            branch_id: body.branch_id,
            category: body.category.as_str().to_string(),
            amount: body.amount,
            description: body.description,
            spent_on: body.spent_on,
            recorded_by: user.id.clone(),
        })
        .await?;

    info!(expense_id = %expense.id, amount = expense.amount, by = %user.id, "Expense recorded");
    Ok(HttpResponse::Created().json(expense))
}

#[utoipa::path(
    put,
    path = "/api/expenses/{id}",
    tag = "expenses",
    request_body = UpdateExpenseBody,
    params(("id" = String, Path, description = "Expense id")),
    responses(
        (status = 200, description = "Expense updated"),
        (status = 404, description = "Unknown expense"),
    )
)]
#[put("/expenses/{id}", wrap = "RequireRole::manager()")]
pub async fn update_expense(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateExpenseBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    let existing = load_expense(&state.db, &user, &path.into_inner()).await?;
    if let Some(date) = &body.spent_on {
        parse_date(date)?;
    }

    let expense = ExpenseRepository::new(state.db.pool())
        .update(
            &existing.id,
            UpdateExpenseRequest {
                category: body.category.map(|c| c.as_str().to_string()),
                amount: body.amount,
                description: body.description,
                spent_on: body.spent_on,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[utoipa::path(
    delete,
    path = "/api/expenses/{id}",
    tag = "expenses",
    params(("id" = String, Path, description = "Expense id")),
    responses(
        (status = 204, description = "Expense deleted"),
        (status = 404, description = "Unknown expense"),
    )
)]
#[delete("/expenses/{id}", wrap = "RequireRole::manager()")]
pub async fn delete_expense(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let expense = load_expense(&state.db, &user, &path.into_inner()).await?;
    ExpenseRepository::new(state.db.pool())
        .delete(&expense.id)
        .await?;

    info!(expense_id = %expense.id, by = %user.id, "Expense deleted");
    Ok(HttpResponse::NoContent().finish())
}
