//! ABOUTME: Student endpoints with seat allocation checks, ledger and dues
//! ABOUTME: Seat and shift are assigned together and must belong to the student's branch

use crate::{
    error::{ApiError, ApiResult},
    middleware::{auth::AuthUser, rbac::RequireRole},
    models::{CreateStudentBody, MonthQuery, Role, StudentQuery, UpdateStudentBody},
    routes::{referenced_branch, report_month},
    AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sd_core::{
    time::{parse_date, today},
    Error,
};
use sd_db::{
    CreateStudentRequest, Db, ReportRepository, SeatRepository, Shift, ShiftRepository, Student,
    StudentFilter, StudentRepository, TransactionRepository, UpdateStudentRequest,
};
use tracing::info;
use validator::Validate;

/// Check a seat/shift pair against `branch_id`; returns the shift when allocated
async fn check_allocation(
    db: &Db,
    branch_id: &str,
    seat_id: Option<&str>,
    shift_id: Option<&str>,
) -> ApiResult<Option<Shift>> {
    let (seat_id, shift_id) = match (seat_id, shift_id) {
        (None, None) => return Ok(None),
        (Some(seat_id), Some(shift_id)) => (seat_id, shift_id),
        _ => {
            return Err(ApiError::bad_request(
                "seatId and shiftId must be assigned together",
            ))
        }
    };

    let seat = SeatRepository::new(db.pool())
        .find_by_id(seat_id)
        .await?
        .filter(|seat| seat.branch_id == branch_id)
        .ok_or_else(|| ApiError::bad_request("Seat does not belong to the student's branch"))?;
    if !seat.is_active {
        return Err(ApiError::bad_request("Seat is not in service"));
    }

    let shift = ShiftRepository::new(db.pool())
        .find_by_id(shift_id)
        .await?
        .filter(|shift| shift.branch_id == branch_id)
        .ok_or_else(|| ApiError::bad_request("Shift does not belong to the student's branch"))?;

    Ok(Some(shift))
}

async fn load_student(db: &Db, user: &AuthUser, id: &str) -> ApiResult<Student> {
    let student = StudentRepository::new(db.pool())
        .find_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound("Student not found".to_string()))?;
    user.ensure_branch(&student.branch_id)?;
    Ok(student)
}

#[utoipa::path(
    get,
    path = "/api/students",
    tag = "students",
    params(StudentQuery),
    responses((status = 200, description = "Students ordered by name"))
)]
#[get("/students", wrap = "RequireRole::staff()")]
pub async fn list_students(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<StudentQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let filter = StudentFilter {
        branch_id: user.scope_branch(query.branch_id)?,
        active: query.active,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };

    let students = StudentRepository::new(state.db.pool()).list(&filter).await?;
    Ok(HttpResponse::Ok().json(students))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}",
    tag = "students",
    params(("id" = String, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student"),
        (status = 404, description = "Unknown student"),
    )
)]
#[get("/students/{id}", wrap = "RequireRole::staff()")]
pub async fn get_student(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let student = load_student(&state.db, &user, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(student))
}

#[utoipa::path(
    post,
    path = "/api/students",
    tag = "students",
    request_body = CreateStudentBody,
    responses(
        (status = 201, description = "Student enrolled"),
        (status = 400, description = "Invalid data or allocation"),
        (status = 409, description = "Seat already taken for that shift"),
    )
)]
#[post("/students", wrap = "RequireRole::staff()")]
pub async fn create_student(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<CreateStudentBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    user.ensure_branch(&body.branch_id)?;
    referenced_branch(&state.db, &body.branch_id).await?;

    let shift = check_allocation(
        &state.db,
        &body.branch_id,
        body.seat_id.as_deref(),
        body.shift_id.as_deref(),
    )
    .await?;

    let monthly_fee = match (body.monthly_fee, &shift) {
        (Some(fee), _) => fee,
        (None, Some(shift)) => shift.monthly_fee,
        (None, None) => {
            return Err(ApiError::bad_request(
                "monthlyFee is required when no shift is assigned",
            ))
        }
    };

    let joining_date = match body.joining_date {
        Some(date) => {
            parse_date(&date)?;
            date
        }
        None => today(),
    };

    let student = StudentRepository::new(state.db.pool())
        .create(CreateStudentRequest {
            branch_id: body.branch_id,
            name: body.name,
            phone: body.phone,
            email: body.email,
            guardian_name: body.guardian_name,
            address: body.address,
            seat_id: body.seat_id,
            shift_id: body.shift_id,
            monthly_fee,
            joining_date,
        })
        .await?;

    info!(student_id = %student.id, branch_id = %student.branch_id, by = %user.id, "Student enrolled");
    Ok(HttpResponse::Created().json(student))
}

#[utoipa::path(
    put,
    path = "/api/students/{id}",
    tag = "students",
    request_body = UpdateStudentBody,
    params(("id" = String, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student updated"),
        (status = 403, description = "Changing isActive needs the manager role"),
        (status = 404, description = "Unknown student"),
        (status = 409, description = "Seat already taken for that shift"),
    )
)]
#[put("/students/{id}", wrap = "RequireRole::staff()")]
pub async fn update_student(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<UpdateStudentBody>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let body = payload.into_inner();
    // Activation follows the same role rule as DELETE
    if body.is_active.is_some() && !user.role.at_least(Role::Manager) {
        return Err(ApiError::forbidden(
            "Only managers can activate or deactivate students",
        ));
    }
    let existing = load_student(&state.db, &user, &path.into_inner()).await?;

    if body.seat_id.is_some() || body.shift_id.is_some() {
        let seat_id = body.seat_id.clone().unwrap_or(existing.seat_id.clone());
        let shift_id = body.shift_id.clone().unwrap_or(existing.shift_id.clone());
        check_allocation(
            &state.db,
            &existing.branch_id,
            seat_id.as_deref(),
            shift_id.as_deref(),
        )
        .await?;
    }

    if let Some(date) = &body.joining_date {
        parse_date(date)?;
    }

    let student = StudentRepository::new(state.db.pool())
        .update(
            &existing.id,
            UpdateStudentRequest {
                name: body.name,
                phone: body.phone,
                email: body.email,
                guardian_name: body.guardian_name,
                address: body.address,
                seat_id: body.seat_id,
                shift_id: body.shift_id,
                monthly_fee: body.monthly_fee,
                joining_date: body.joining_date,
                is_active: body.is_active,
            },
        )
        .await?;

    info!(student_id = %student.id, by = %user.id, "Student updated");
    Ok(HttpResponse::Ok().json(student))
}

#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    tag = "students",
    params(("id" = String, Path, description = "Student id")),
    responses(
        (status = 204, description = "Student deactivated and seat released"),
        (status = 404, description = "Unknown student"),
    )
)]
#[delete("/students/{id}", wrap = "RequireRole::manager()")]
pub async fn delete_student(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let student = load_student(&state.db, &user, &path.into_inner()).await?;
    StudentRepository::new(state.db.pool())
        .deactivate(&student.id)
        .await?;

    info!(student_id = %student.id, by = %user.id, "Student deactivated");
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/transactions",
    tag = "students",
    params(("id" = String, Path, description = "Student id")),
    responses((status = 200, description = "Payment ledger, newest first"))
)]
#[get("/students/{id}/transactions", wrap = "RequireRole::staff()")]
pub async fn student_transactions(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let student = load_student(&state.db, &user, &path.into_inner()).await?;
    let ledger = TransactionRepository::new(state.db.pool())
        .list_for_student(&student.id)
        .await?;
    Ok(HttpResponse::Ok().json(ledger))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/due",
    tag = "students",
    params(("id" = String, Path, description = "Student id"), MonthQuery),
    responses((status = 200, description = "Fee, paid and due for the month"))
)]
#[get("/students/{id}/due", wrap = "RequireRole::staff()")]
pub async fn student_due(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> ApiResult<HttpResponse> {
    let month = report_month(query.into_inner().month)?;
    let student = load_student(&state.db, &user, &path.into_inner()).await?;

    let due = ReportRepository::new(state.db.pool())
        .student_due(&student.id, &month)
        .await?;
    Ok(HttpResponse::Ok().json(due))
}
