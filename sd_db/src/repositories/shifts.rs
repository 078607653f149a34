//! ABOUTME: Shift repository for per-branch daily time slots
//! ABOUTME: A shift carries the default monthly fee for seats booked in it

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

const SHIFT_COLUMNS: &str =
    "id, branch_id, name, start_time, end_time, monthly_fee, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub monthly_fee: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateShiftRequest {
    pub branch_id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub monthly_fee: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateShiftRequest {
    pub name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub monthly_fee: Option<i64>,
}

pub struct ShiftRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ShiftRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateShiftRequest) -> Result<Shift> {
        let now = now_iso8601();

        sqlx::query_as::<_, Shift>(&format!(
            r#"
            INSERT INTO shifts (id, branch_id, name, start_time, end_time, monthly_fee, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {SHIFT_COLUMNS}
            "#
        ))
        .bind(Id::new().to_string())
        .bind(request.branch_id)
        .bind(request.name)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(request.monthly_fee)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to create shift", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Shift>> {
        sqlx::query_as::<_, Shift>(&format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| db_error("Failed to find shift", e))
    }

    /// List shifts, optionally for one branch, ordered by start time
    #[instrument(skip(self))]
    pub async fn list(&self, branch_id: Option<&str>) -> Result<Vec<Shift>> {
        sqlx::query_as::<_, Shift>(&format!(
            r#"
            SELECT {SHIFT_COLUMNS} FROM shifts
            WHERE (?1 IS NULL OR branch_id = ?1)
            ORDER BY branch_id, start_time, name
            "#
        ))
        .bind(branch_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list shifts", e))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateShiftRequest) -> Result<Shift> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Shift not found".to_string()))?;

        sqlx::query_as::<_, Shift>(&format!(
            r#"
            UPDATE shifts SET name = ?1, start_time = ?2, end_time = ?3, monthly_fee = ?4, updated_at = ?5
            WHERE id = ?6
            RETURNING {SHIFT_COLUMNS}
            "#
        ))
        .bind(request.name.unwrap_or(current.name))
        .bind(request.start_time.unwrap_or(current.start_time))
        .bind(request.end_time.unwrap_or(current.end_time))
        .bind(request.monthly_fee.unwrap_or(current.monthly_fee))
        .bind(now_iso8601())
        .bind(id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to update shift", e))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM shifts WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| db_error("Failed to delete shift", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Shift not found".to_string()));
        }
        Ok(())
    }
}
