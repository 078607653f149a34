//! ABOUTME: Seat repository and per-shift seat availability
//! ABOUTME: A seat is occupied for a shift when an active student holds that pair

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const SEAT_COLUMNS: &str = "id, branch_id, label, is_active, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: String,
    pub branch_id: String,
    pub label: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateSeatRequest {
    pub branch_id: String,
    pub label: String,
}

/// `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct UpdateSeatRequest {
    pub label: Option<String>,
    pub is_active: Option<bool>,
}

/// Seat occupancy for one shift
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    pub seat_id: String,
    pub label: String,
    pub occupied: bool,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
}

pub struct SeatRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SeatRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateSeatRequest) -> Result<Seat> {
        sqlx::query_as::<_, Seat>(&format!(
            r#"
            INSERT INTO seats (id, branch_id, label, is_active, created_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            RETURNING {SEAT_COLUMNS}
            "#
        ))
        .bind(Id::new().to_string())
        .bind(request.branch_id)
        .bind(request.label)
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to create seat", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Seat>> {
        sqlx::query_as::<_, Seat>(&format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| db_error("Failed to find seat", e))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, branch_id: Option<&str>) -> Result<Vec<Seat>> {
        sqlx::query_as::<_, Seat>(&format!(
            r#"
            SELECT {SEAT_COLUMNS} FROM seats
            WHERE (?1 IS NULL OR branch_id = ?1)
            ORDER BY branch_id, label
            "#
        ))
        .bind(branch_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list seats", e))
    }

    /// Active seats of a branch with their occupant for `shift_id`
    #[instrument(skip(self))]
    pub async fn availability(&self, branch_id: &str, shift_id: &str) -> Result<Vec<SeatAvailability>> {
        let seats = sqlx::query_as::<_, SeatAvailability>(
            r#"
            SELECT s.id AS seat_id,
                   s.label AS label,
                   (st.id IS NOT NULL) AS occupied,
                   st.id AS student_id,
                   st.name AS student_name
            FROM seats s
            LEFT JOIN students st
                ON st.seat_id = s.id AND st.shift_id = ?2 AND st.is_active = 1
            WHERE s.branch_id = ?1 AND s.is_active = 1
            ORDER BY s.label
            "#,
        )
        .bind(branch_id)
        .bind(shift_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to load seat availability", e))?;

        debug!(
            total = seats.len(),
            occupied = seats.iter().filter(|s| s.occupied).count(),
            "Seat availability loaded"
        );
        Ok(seats)
    }

    /// Rename or take a seat in or out of service.
    ///
    /// A seat still held by an active student in any shift cannot be taken
    /// out of service.
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateSeatRequest) -> Result<Seat> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Seat not found".to_string()))?;

        if request.is_active == Some(false) && current.is_active {
            let holders: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM students WHERE seat_id = ?1 AND is_active = 1",
            )
            .bind(id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| db_error("Failed to check seat occupancy", e))?;

            if holders > 0 {
                return Err(Error::Conflict(
                    "Seat is held by an active student".to_string(),
                ));
            }
        }

        let seat = sqlx::query_as::<_, Seat>(&format!(
            "UPDATE seats SET label = ?1, is_active = ?2 WHERE id = ?3 RETURNING {SEAT_COLUMNS}"
        ))
        .bind(request.label.unwrap_or(current.label))
        .bind(request.is_active.unwrap_or(current.is_active))
        .bind(id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to update seat", e))?;

        debug!(seat_id = %seat.id, is_active = seat.is_active, "Seat updated");
        Ok(seat)
    }

    /// Hard delete; fails with `Conflict` if any student ever held the seat
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM seats WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| db_error("Failed to delete seat", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Seat not found".to_string()));
        }
        Ok(())
    }
}
