//! ABOUTME: Expense repository for branch running costs
//! ABOUTME: Expenses feed the profit/loss report by the month they were spent in

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const EXPENSE_COLUMNS: &str =
    "id, branch_id, category, amount, description, spent_on, recorded_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub branch_id: String,
    pub category: String,
    pub amount: i64,
    pub description: Option<String>,
    pub spent_on: String,
    pub recorded_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateExpenseRequest {
    pub branch_id: String,
    pub category: String,
    pub amount: i64,
    pub description: Option<String>,
    pub spent_on: String,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExpenseRequest {
    pub category: Option<String>,
    pub amount: Option<i64>,
    pub description: Option<Option<String>>,
    pub spent_on: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub branch_id: Option<String>,
    /// Matches the month of `spent_on`
    pub month: Option<String>,
    pub category: Option<String>,
}

pub struct ExpenseRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ExpenseRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateExpenseRequest) -> Result<Expense> {
        let now = now_iso8601();

        sqlx::query_as::<_, Expense>(&format!(
            r#"
            INSERT INTO expenses (id, branch_id, category, amount, description, spent_on,
                                  recorded_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            RETURNING {EXPENSE_COLUMNS}
            "#
        ))
        .bind(Id::new().to_string())
        .bind(request.branch_id)
        .bind(request.category)
        .bind(request.amount)
        .bind(request.description)
        .bind(request.spent_on)
        .bind(request.recorded_by)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to record expense", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Expense>> {
        sqlx::query_as::<_, Expense>(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| db_error("Failed to find expense", e))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(&format!(
            r#"
            SELECT {EXPENSE_COLUMNS} FROM expenses
            WHERE (?1 IS NULL OR branch_id = ?1)
              AND (?2 IS NULL OR substr(spent_on, 1, 7) = ?2)
              AND (?3 IS NULL OR category = ?3)
            ORDER BY spent_on DESC, created_at DESC
            "#
        ))
        .bind(filter.branch_id.as_deref())
        .bind(filter.month.as_deref())
        .bind(filter.category.as_deref())
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list expenses", e))?;

        debug!("Found {} expenses", expenses.len());
        Ok(expenses)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateExpenseRequest) -> Result<Expense> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Expense not found".to_string()))?;

        sqlx::query_as::<_, Expense>(&format!(
            r#"
            UPDATE expenses
            SET category = ?1, amount = ?2, description = ?3, spent_on = ?4, updated_at = ?5
            WHERE id = ?6
            RETURNING {EXPENSE_COLUMNS}
            "#
        ))
        .bind(request.category.unwrap_or(current.category))
        .bind(request.amount.unwrap_or(current.amount))
        .bind(request.description.unwrap_or(current.description))
        .bind(request.spent_on.unwrap_or(current.spent_on))
        .bind(now_iso8601())
        .bind(id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to update expense", e))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| db_error("Failed to delete expense", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Expense not found".to_string()));
        }
        Ok(())
    }
}
