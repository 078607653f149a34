//! ABOUTME: Web API layer with session authentication, RBAC and routing
//! ABOUTME: Provides REST endpoints, OpenAPI documentation and the dashboard assets

use actix_web::{middleware::Logger, web, App, HttpServer};
use sd_config::Config;
use sd_core::Result;
use sd_db::Db;
use sd_obs::Metrics;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

#[cfg(test)]
mod tests;

use middleware::{
    auth::RequireAuth, metrics::RequestMetrics, ratelimit::RateLimit, ratelimit::RateLimiter,
};
use routes::{
    admin, auth as auth_routes, branches, expenses, public, reports, seats, shifts, static_files,
    students, transactions, users,
};

/// Application state shared across all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Db,
    pub security: sd_config::SecurityConfig,
    pub tokens: auth::SessionTokens,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: RateLimiter,
    pub static_config: static_files::StaticConfig,
    pub json_limit: usize,
}

impl AppState {
    pub fn new(db: Db, config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            db,
            security: config.security.clone(),
            tokens: auth::SessionTokens::new(
                config.security.session_secret.clone(),
                config.security.session_ttl_hours,
            ),
            metrics,
            rate_limiter: RateLimiter::from_config(&config.server.rate_limit),
            static_config: static_files::StaticConfig::new(&config.server.static_dir),
            json_limit: config.server.json_limit,
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        auth_routes::login,
        auth_routes::logout,
        auth_routes::setup_needed,
        auth_routes::setup_signup,
        public::me,
        public::health,
        branches::list_branches,
        branches::get_branch,
        branches::create_branch,
        branches::update_branch,
        branches::delete_branch,
        shifts::list_shifts,
        shifts::create_shift,
        shifts::update_shift,
        shifts::delete_shift,
        seats::list_seats,
        seats::seat_availability,
        seats::create_seat,
        seats::update_seat,
        seats::delete_seat,
        students::list_students,
        students::get_student,
        students::create_student,
        students::update_student,
        students::delete_student,
        students::student_transactions,
        students::student_due,
        transactions::list_transactions,
        transactions::create_transaction,
        transactions::delete_transaction,
        expenses::list_expenses,
        expenses::create_expense,
        expenses::update_expense,
        expenses::delete_expense,
        users::list_users,
        users::create_user,
        users::update_user,
        users::delete_user,
        reports::profit_loss,
        reports::dues,
        reports::summary,
        admin::stats,
    ),
    components(
        schemas(
            models::Role,
            models::PaymentMode,
            models::ExpenseCategory,
            models::LoginRequest,
            models::SignupRequest,
            models::LoginResponse,
            models::SetupStatus,
            models::UserInfo,
            models::CreateUserBody,
            models::UpdateUserBody,
            models::CreateBranchBody,
            models::UpdateBranchBody,
            models::CreateShiftBody,
            models::UpdateShiftBody,
            models::CreateSeatBody,
            models::UpdateSeatBody,
            models::CreateStudentBody,
            models::UpdateStudentBody,
            models::CreateTransactionBody,
            models::CreateExpenseBody,
            models::UpdateExpenseBody,
        ),
    ),
    tags(
        (name = "auth", description = "Sessions and first-run setup"),
        (name = "public", description = "Unauthenticated endpoints"),
        (name = "branches", description = "Library locations"),
        (name = "shifts", description = "Daily time slots"),
        (name = "seats", description = "Seats and per-shift availability"),
        (name = "students", description = "Members and their allocations"),
        (name = "transactions", description = "Fee collections"),
        (name = "expenses", description = "Branch running costs"),
        (name = "users", description = "Back-office accounts"),
        (name = "reports", description = "Profit/loss, dues and summary"),
        (name = "admin", description = "Maintenance"),
    )
)]
pub struct ApiDoc;

/// Create the main web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let static_config = state.static_config.clone();
    let rate_limiter = state.rate_limiter.clone();
    let metrics = Arc::clone(&state.metrics);
    let json_config = web::JsonConfig::default()
        .limit(state.json_limit)
        .error_handler(error::json_error_handler);

    App::new()
        .app_data(web::Data::new(state))
        .app_data(web::Data::new(static_config))
        .app_data(json_config)
        .app_data(web::QueryConfig::default().error_handler(error::query_error_handler))
        .wrap(RequestMetrics::new(metrics))
        .wrap(Logger::default())
        .wrap(static_files::security_headers())
        .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .service(public::health)
        .service(
            web::scope("/api/auth")
                .wrap(RateLimit::new(rate_limiter))
                .service(auth_routes::login)
                .service(auth_routes::logout)
                .service(auth_routes::setup_needed)
                .service(auth_routes::setup_signup),
        )
        .service(
            // Role checks are attached per route; this scope only requires a session
            web::scope("/api")
                .wrap(RequireAuth::new())
                .service(public::me)
                .service(branches::list_branches)
                .service(branches::get_branch)
                .service(branches::create_branch)
                .service(branches::update_branch)
                .service(branches::delete_branch)
                .service(shifts::list_shifts)
                .service(shifts::create_shift)
                .service(shifts::update_shift)
                .service(shifts::delete_shift)
                .service(seats::seat_availability)
                .service(seats::list_seats)
                .service(seats::create_seat)
                .service(seats::update_seat)
                .service(seats::delete_seat)
                .service(students::list_students)
                .service(students::get_student)
                .service(students::create_student)
                .service(students::update_student)
                .service(students::delete_student)
                .service(students::student_transactions)
                .service(students::student_due)
                .service(transactions::list_transactions)
                .service(transactions::create_transaction)
                .service(transactions::delete_transaction)
                .service(expenses::list_expenses)
                .service(expenses::create_expense)
                .service(expenses::update_expense)
                .service(expenses::delete_expense)
                .service(users::list_users)
                .service(users::create_user)
                .service(users::update_user)
                .service(users::delete_user)
                .service(reports::profit_loss)
                .service(reports::dues)
                .service(reports::summary)
                .service(admin::stats),
        )
        .default_service(web::to(static_files::spa_fallback))
}

/// Start the web server
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    tracing::info!("Starting web server on {}", bind_addr);

    HttpServer::new(move || create_app(state.clone()))
        .bind(bind_addr)
        .map_err(|e| sd_core::Error::Config(format!("Failed to bind web server: {}", e)))?
        .run()
        .await
        .map_err(|e| sd_core::Error::Config(format!("Web server error: {}", e)))?;

    Ok(())
}
