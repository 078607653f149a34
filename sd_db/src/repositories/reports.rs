//! ABOUTME: Monthly report aggregation: profit/loss, dues and dashboard summary
//! ABOUTME: All figures are computed in SQL over integer minor units

use crate::db_error;
use sd_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Grouped total, e.g. per payment mode or expense category
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AmountByKey {
    pub key: String,
    pub amount: i64,
    pub count: i64,
}

/// Cash-basis profit and loss for one month
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitLoss {
    pub month: String,
    pub branch_id: Option<String>,
    pub total_collected: i64,
    pub total_expenses: i64,
    pub net_profit: i64,
    pub collection_count: i64,
    pub expense_count: i64,
    pub collections_by_mode: Vec<AmountByKey>,
    pub expenses_by_category: Vec<AmountByKey>,
}

/// Outstanding balance of one student for one month
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentDue {
    pub student_id: String,
    pub name: String,
    pub phone: String,
    pub branch_id: String,
    pub seat_label: Option<String>,
    pub shift_name: Option<String>,
    pub monthly_fee: i64,
    pub paid: i64,
    pub due: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuesReport {
    pub month: String,
    pub branch_id: Option<String>,
    pub total_due: i64,
    pub students: Vec<StudentDue>,
}

/// Headline numbers for the dashboard cards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub month: String,
    pub branch_id: Option<String>,
    pub active_students: i64,
    pub total_seats: i64,
    pub occupied_seats: i64,
    pub total_collected: i64,
    pub total_expenses: i64,
    pub net_profit: i64,
    pub total_due: i64,
}

#[derive(FromRow)]
struct Totals {
    total: i64,
    count: i64,
}

// ?1 = month, ?2 = optional branch; `paid` sums collections booked for the month
const DUE_SELECT: &str = r#"
    SELECT s.id AS student_id,
           s.name AS name,
           s.phone AS phone,
           s.branch_id AS branch_id,
           se.label AS seat_label,
           sh.name AS shift_name,
           s.monthly_fee AS monthly_fee,
           COALESCE(p.paid, 0) AS paid,
           CASE
               WHEN substr(s.joining_date, 1, 7) > ?1 THEN 0
               ELSE MAX(s.monthly_fee - COALESCE(p.paid, 0), 0)
           END AS due
    FROM students s
    LEFT JOIN (
        SELECT student_id, SUM(amount) AS paid
        FROM transactions
        WHERE for_month = ?1
        GROUP BY student_id
    ) p ON p.student_id = s.id
    LEFT JOIN seats se ON se.id = s.seat_id
    LEFT JOIN shifts sh ON sh.id = s.shift_id
"#;

pub struct ReportRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReportRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Collections by `paid_on` month against expenses by `spent_on` month
    #[instrument(skip(self))]
    pub async fn profit_loss(&self, month: &str, branch_id: Option<&str>) -> Result<ProfitLoss> {
        let collected = sqlx::query_as::<_, Totals>(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total, COUNT(*) AS count
            FROM transactions
            WHERE substr(paid_on, 1, 7) = ?1 AND (?2 IS NULL OR branch_id = ?2)
            "#,
        )
        .bind(month)
        .bind(branch_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to total collections", e))?;

        let spent = sqlx::query_as::<_, Totals>(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total, COUNT(*) AS count
            FROM expenses
            WHERE substr(spent_on, 1, 7) = ?1 AND (?2 IS NULL OR branch_id = ?2)
            "#,
        )
        .bind(month)
        .bind(branch_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to total expenses", e))?;

        let collections_by_mode = sqlx::query_as::<_, AmountByKey>(
            r#"
            SELECT payment_mode AS "key", SUM(amount) AS amount, COUNT(*) AS count
            FROM transactions
            WHERE substr(paid_on, 1, 7) = ?1 AND (?2 IS NULL OR branch_id = ?2)
            GROUP BY payment_mode
            ORDER BY amount DESC, payment_mode ASC
            "#,
        )
        .bind(month)
        .bind(branch_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to group collections", e))?;

        let expenses_by_category = sqlx::query_as::<_, AmountByKey>(
            r#"
            SELECT category AS "key", SUM(amount) AS amount, COUNT(*) AS count
            FROM expenses
            WHERE substr(spent_on, 1, 7) = ?1 AND (?2 IS NULL OR branch_id = ?2)
            GROUP BY category
            ORDER BY amount DESC, category ASC
            "#,
        )
        .bind(month)
        .bind(branch_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to group expenses", e))?;

        debug!(
            collected = collected.total,
            expenses = spent.total,
            "Computed profit/loss for {}",
            month
        );

        Ok(ProfitLoss {
            month: month.to_string(),
            branch_id: branch_id.map(str::to_string),
            total_collected: collected.total,
            total_expenses: spent.total,
            net_profit: collected.total - spent.total,
            collection_count: collected.count,
            expense_count: spent.count,
            collections_by_mode,
            expenses_by_category,
        })
    }

    /// Active students with an unpaid balance for the month, largest first
    #[instrument(skip(self))]
    pub async fn dues(&self, month: &str, branch_id: Option<&str>) -> Result<DuesReport> {
        let students = sqlx::query_as::<_, StudentDue>(&format!(
            r#"
            {DUE_SELECT}
            WHERE s.is_active = 1
              AND substr(s.joining_date, 1, 7) <= ?1
              AND (?2 IS NULL OR s.branch_id = ?2)
              AND s.monthly_fee - COALESCE(p.paid, 0) > 0
            ORDER BY due DESC, s.name COLLATE NOCASE ASC
            "#
        ))
        .bind(month)
        .bind(branch_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to compute dues", e))?;

        let total_due = students.iter().map(|s| s.due).sum();
        debug!("{} students owe {} for {}", students.len(), total_due, month);

        Ok(DuesReport {
            month: month.to_string(),
            branch_id: branch_id.map(str::to_string),
            total_due,
            students,
        })
    }

    /// Due for a single student; zero when fully paid or not yet joined
    #[instrument(skip(self))]
    pub async fn student_due(&self, student_id: &str, month: &str) -> Result<StudentDue> {
        sqlx::query_as::<_, StudentDue>(&format!("{DUE_SELECT} WHERE s.id = ?2"))
            .bind(month)
            .bind(student_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| db_error("Failed to compute student due", e))?
            .ok_or_else(|| Error::NotFound("Student not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, month: &str, branch_id: Option<&str>) -> Result<DashboardSummary> {
        let active_students: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM students WHERE is_active = 1 AND (?1 IS NULL OR branch_id = ?1)",
        )
        .bind(branch_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to count students", e))?;

        let total_seats: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seats WHERE is_active = 1 AND (?1 IS NULL OR branch_id = ?1)",
        )
        .bind(branch_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to count seats", e))?;

        let occupied_seats: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT seat_id) FROM students
            WHERE is_active = 1 AND seat_id IS NOT NULL AND (?1 IS NULL OR branch_id = ?1)
            "#,
        )
        .bind(branch_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to count occupied seats", e))?;

        let pl = self.profit_loss(month, branch_id).await?;
        let dues = self.dues(month, branch_id).await?;

        Ok(DashboardSummary {
            month: month.to_string(),
            branch_id: branch_id.map(str::to_string),
            active_students,
            total_seats,
            occupied_seats,
            total_collected: pl.total_collected,
            total_expenses: pl.total_expenses,
            net_profit: pl.net_profit,
            total_due: dues.total_due,
        })
    }
}
