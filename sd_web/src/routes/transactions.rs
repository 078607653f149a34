//! ABOUTME: Fee collection endpoints
//! ABOUTME: The branch comes from the student and the collector from the session

use crate::{
    error::ApiResult,
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{CreateTransactionBody, TransactionQuery},
    AppState,
};
use actix_web::{delete, get, post, web, HttpResponse};
use sd_core::{
    time::{parse_date, today, validate_month},
    Error,
};
use sd_db::{CreateTransactionRequest, StudentRepository, TransactionFilter, TransactionRepository};
use tracing::info;
use validator::Validate;

#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "transactions",
    params(TransactionQuery),
    responses((status = 200, description = "Collections, newest payment first"))
)]
#[get("/transactions", wrap = "RequireRole::staff()")]
pub async fn list_transactions(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<TransactionQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    if let Some(month) = &query.month {
        validate_month(month)?;
    }

    let filter = TransactionFilter {
        branch_id: user.scope_branch(query.branch_id)?,
        month: query.month,
        student_id: query.student_id,
    };
    let transactions = TransactionRepository::new(state.db.pool())
        .list(&filter)
        .await?;
    Ok(HttpResponse::Ok().json(transactions))
}

#[utoipa::path(
    post,
    path = "/api/transactions",
    tag = "transactions",
    request_body = CreateTransactionBody,
    responses(
        (status = 201, description = "Collection recorded"),
        (status = 400, description = "Invalid amount, month or date"),
        (status = 404, description = "Unknown student"),
    )
)]
#[post("/transactions", wrap = "RequireRole::staff()")]
pub async fn create_transaction(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateTransactionBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    validate_month(&body.for_month)?;

    let student = StudentRepository::new(state.db.pool())
        .find_by_id(&body.student_id)
        .await?
        .ok_or_else(|| Error::NotFound("Student not found".to_string()))?;
    user.ensure_branch(&student.branch_id)?;

    let paid_on = match body.paid_on {
        Some(date) => {
            parse_date(&date)?;
            date
        }
        None => today(),
    };

    let transaction = TransactionRepository::new(state.db.pool())
        .create(CreateTransactionRequest {
            student_id: student.id,
            amount: body.amount,
            payment_mode: body.payment_mode.as_str().to_string(),
            for_month: body.for_month,
            paid_on,
            note: body.note,
            collected_by: user.id.clone(),
        })
        .await?;

    state.metrics.record_collection(transaction.amount);
    info!(
        transaction_id = %transaction.id,
        student_id = %transaction.student_id,
        amount = transaction.amount,
        by = %user.id,
        "Collection recorded"
    );
    Ok(HttpResponse::Created().json(transaction))
}

#[utoipa::path(
    delete,
    path = "/api/transactions/{id}",
    tag = "transactions",
    params(("id" = String, Path, description = "Transaction id")),
    responses(
        (status = 204, description = "Collection removed"),
        (status = 404, description = "Unknown transaction"),
    )
)]
#[delete("/transactions/{id}", wrap = "RequireRole::admin()")]
pub async fn delete_transaction(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    TransactionRepository::new(state.db.pool()).delete(&id).await?;

    info!(transaction_id = %id, by = %user.id, "Collection deleted");
    Ok(HttpResponse::NoContent().finish())
}
