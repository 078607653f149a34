//! ABOUTME: Request and response bodies for the back-office API with validation rules
//! ABOUTME: Defines request/response structures, roles and RFC 7807 problem details

use regex::Regex;
use sd_db::User;
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashMap, fmt, str::FromStr, sync::LazyLock};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("phone pattern compiles"));
pub static MONTH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-(0[1-9]|1[0-2])$").expect("month pattern compiles"));
pub static DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$")
        .expect("date pattern compiles")
});
pub static TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("time pattern compiles"));

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// User roles enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Role::Staff => 0,
            Role::Manager => 1,
            Role::Admin => 2,
        }
    }

    /// True when this role carries at least the privileges of `minimum`
    pub fn at_least(self, minimum: Role) -> bool {
        self.rank() >= minimum.rank()
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "staff" => Ok(Role::Staff),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
    BankTransfer,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Upi => "upi",
            PaymentMode::Card => "card",
            PaymentMode::BankTransfer => "bank_transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Rent,
    Electricity,
    Internet,
    Salary,
    Maintenance,
    Supplies,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Rent => "rent",
            ExpenseCategory::Electricity => "electricity",
            ExpenseCategory::Internet => "internet",
            ExpenseCategory::Salary => "salary",
            ExpenseCategory::Maintenance => "maintenance",
            ExpenseCategory::Supplies => "supplies",
            ExpenseCategory::Other => "other",
        }
    }
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub branch_id: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

/// RFC 7807 problem details body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl ProblemDetails {
    pub fn new(type_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            title: title.into(),
            status: None,
            detail: None,
            instance: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    pub fn validation_error(detail: impl Into<String>) -> Self {
        Self::new(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.1",
            "Bad Request",
        )
        .with_status(400)
        .with_detail(detail)
    }

    pub fn rate_limit_error(retry_after: Option<u64>) -> Self {
        let problem = Self::new(
            "https://datatracker.ietf.org/rfc/rfc6585.html#section-4",
            "Too Many Requests",
        )
        .with_status(429)
        .with_detail("Too many requests, slow down");

        match retry_after {
            Some(secs) => problem.with_extension("retryAfter", serde_json::json!(secs)),
            None => problem,
        }
    }
}

/// One failed field in a validation problem
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub code: String,
    pub message: String,
}

// ---- auth ----

/// Request body for user login
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// First-admin signup
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Response for successful login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetupStatus {
    pub needs_setup: bool,
}

/// User information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub branch_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            branch_id: user.branch_id,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

// ---- users ----

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: Role,
    pub branch_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserBody {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub branch_id: Option<Option<String>>,
    pub is_active: Option<bool>,
}

// ---- branches ----

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchBody {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(regex(path = *PHONE_REGEX, message = "Phone must be 10-15 digits"))]
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBranchBody {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(regex(path = *PHONE_REGEX, message = "Phone must be 10-15 digits"))]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
}

// ---- shifts & seats ----

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateShiftBody {
    #[validate(length(min = 1))]
    pub branch_id: String,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(regex(path = *TIME_REGEX, message = "Use HH:MM"))]
    pub start_time: String,
    #[validate(regex(path = *TIME_REGEX, message = "Use HH:MM"))]
    pub end_time: String,
    #[validate(range(min = 0))]
    pub monthly_fee: i64,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShiftBody {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(regex(path = *TIME_REGEX, message = "Use HH:MM"))]
    pub start_time: Option<String>,
    #[validate(regex(path = *TIME_REGEX, message = "Use HH:MM"))]
    pub end_time: Option<String>,
    #[validate(range(min = 0))]
    pub monthly_fee: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSeatBody {
    #[validate(length(min = 1))]
    pub branch_id: String,
    #[validate(length(min = 1, max = 20))]
    pub label: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSeatBody {
    #[validate(length(min = 1, max = 20))]
    pub label: Option<String>,
    /// `false` takes the seat out of service
    pub is_active: Option<bool>,
}

// ---- students ----

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentBody {
    #[validate(length(min = 1))]
    pub branch_id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(regex(path = *PHONE_REGEX, message = "Phone must be 10-15 digits"))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub guardian_name: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub seat_id: Option<String>,
    pub shift_id: Option<String>,
    /// Defaults to the shift's fee when omitted
    #[validate(range(min = 0))]
    pub monthly_fee: Option<i64>,
    /// Defaults to today
    #[validate(regex(path = *DATE_REGEX, message = "Use YYYY-MM-DD"))]
    pub joining_date: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentBody {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(regex(path = *PHONE_REGEX, message = "Phone must be 10-15 digits"))]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(email)]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub guardian_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub seat_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub shift_id: Option<Option<String>>,
    #[validate(range(min = 0))]
    pub monthly_fee: Option<i64>,
    #[validate(regex(path = *DATE_REGEX, message = "Use YYYY-MM-DD"))]
    pub joining_date: Option<String>,
    pub is_active: Option<bool>,
}

// ---- money ----

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionBody {
    #[validate(length(min = 1))]
    pub student_id: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub payment_mode: PaymentMode,
    #[validate(regex(path = *MONTH_REGEX, message = "Use YYYY-MM"))]
    pub for_month: String,
    /// Defaults to today
    #[validate(regex(path = *DATE_REGEX, message = "Use YYYY-MM-DD"))]
    pub paid_on: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseBody {
    #[validate(length(min = 1))]
    pub branch_id: String,
    pub category: ExpenseCategory,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(regex(path = *DATE_REGEX, message = "Use YYYY-MM-DD"))]
    pub spent_on: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpenseBody {
    pub category: Option<ExpenseCategory>,
    #[validate(range(min = 1))]
    pub amount: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[validate(regex(path = *DATE_REGEX, message = "Use YYYY-MM-DD"))]
    pub spent_on: Option<String>,
}

// ---- query strings ----

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BranchQuery {
    pub branch_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    pub branch_id: String,
    pub shift_id: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StudentQuery {
    pub branch_id: Option<String>,
    pub active: Option<bool>,
    /// Matches name or phone
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    pub branch_id: Option<String>,
    /// Billing month (`forMonth`), YYYY-MM
    pub month: Option<String>,
    pub student_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ExpenseQuery {
    pub branch_id: Option<String>,
    /// Month of `spentOn`, YYYY-MM
    pub month: Option<String>,
    pub category: Option<ExpenseCategory>,
}

/// `month` defaults to the current month when omitted
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    pub month: Option<String>,
    pub branch_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct MonthQuery {
    pub month: Option<String>,
}
