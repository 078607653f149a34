//! ABOUTME: Student repository for membership records and seat allocations
//! ABOUTME: An active student may hold one (seat, shift) pair exclusively

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const STUDENT_COLUMNS: &str = "id, branch_id, name, phone, email, guardian_name, address, \
     seat_id, shift_id, monthly_fee, joining_date, is_active, created_at, updated_at";

/// Student entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub guardian_name: Option<String>,
    pub address: Option<String>,
    pub seat_id: Option<String>,
    pub shift_id: Option<String>,
    pub monthly_fee: i64,
    pub joining_date: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateStudentRequest {
    pub branch_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub guardian_name: Option<String>,
    pub address: Option<String>,
    pub seat_id: Option<String>,
    pub shift_id: Option<String>,
    pub monthly_fee: i64,
    pub joining_date: String,
}

/// Partial update; the outer `None` keeps a field, `Some(None)` clears a nullable one
#[derive(Debug, Clone, Default)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<Option<String>>,
    pub guardian_name: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub seat_id: Option<Option<String>>,
    pub shift_id: Option<Option<String>>,
    pub monthly_fee: Option<i64>,
    pub joining_date: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateStudentRequest {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.guardian_name.is_none()
            && self.address.is_none()
            && self.seat_id.is_none()
            && self.shift_id.is_none()
            && self.monthly_fee.is_none()
            && self.joining_date.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub branch_id: Option<String>,
    pub active: Option<bool>,
    /// Substring match on name or phone
    pub search: Option<String>,
}

pub struct StudentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StudentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateStudentRequest) -> Result<Student> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Registering student {} in branch {}", id, request.branch_id);

        sqlx::query_as::<_, Student>(&format!(
            r#"
            INSERT INTO students (id, branch_id, name, phone, email, guardian_name, address,
                                  seat_id, shift_id, monthly_fee, joining_date, is_active,
                                  created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?12)
            RETURNING {STUDENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.branch_id)
        .bind(request.name)
        .bind(request.phone)
        .bind(request.email)
        .bind(request.guardian_name)
        .bind(request.address)
        .bind(request.seat_id)
        .bind(request.shift_id)
        .bind(request.monthly_fee)
        .bind(request.joining_date)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to create student", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| db_error("Failed to find student", e))
    }

    /// Filtered, unpaginated student list ordered by name
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &StudentFilter) -> Result<Vec<Student>> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let students = sqlx::query_as::<_, Student>(&format!(
            r#"
            SELECT {STUDENT_COLUMNS} FROM students
            WHERE (?1 IS NULL OR branch_id = ?1)
              AND (?2 IS NULL OR is_active = ?2)
              AND (?3 IS NULL OR name LIKE ?3 OR phone LIKE ?3)
            ORDER BY name COLLATE NOCASE ASC
            "#
        ))
        .bind(filter.branch_id.as_deref())
        .bind(filter.active)
        .bind(pattern)
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list students", e))?;

        debug!("Found {} students", students.len());
        Ok(students)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateStudentRequest) -> Result<Student> {
        if request.is_empty() {
            return Err(Error::Validation("No fields to update".to_string()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let current = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to find student", e))?
        .ok_or_else(|| Error::NotFound("Student not found".to_string()))?;

        let student = sqlx::query_as::<_, Student>(&format!(
            r#"
            UPDATE students
            SET name = ?1, phone = ?2, email = ?3, guardian_name = ?4, address = ?5,
                seat_id = ?6, shift_id = ?7, monthly_fee = ?8, joining_date = ?9,
                is_active = ?10, updated_at = ?11
            WHERE id = ?12
            RETURNING {STUDENT_COLUMNS}
            "#
        ))
        .bind(request.name.unwrap_or(current.name))
        .bind(request.phone.unwrap_or(current.phone))
        .bind(request.email.unwrap_or(current.email))
        .bind(request.guardian_name.unwrap_or(current.guardian_name))
        .bind(request.address.unwrap_or(current.address))
        .bind(request.seat_id.unwrap_or(current.seat_id))
        .bind(request.shift_id.unwrap_or(current.shift_id))
        .bind(request.monthly_fee.unwrap_or(current.monthly_fee))
        .bind(request.joining_date.unwrap_or(current.joining_date))
        .bind(request.is_active.unwrap_or(current.is_active))
        .bind(now_iso8601())
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update student", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        debug!("Updated student: {}", student.id);
        Ok(student)
    }

    /// Soft delete; the seat allocation stops counting once inactive
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE students SET is_active = 0, updated_at = ?1 WHERE id = ?2")
                .bind(now_iso8601())
                .bind(id)
                .execute(self.pool)
                .await
                .map_err(|e| db_error("Failed to deactivate student", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Student not found".to_string()));
        }

        debug!("Deactivated student: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_fixtures, Db};

    #[tokio::test]
    async fn test_list_filters() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        let other = test_fixtures::branch(&db).await;
        let repo = StudentRepository::new(db.pool());

        let asha = test_fixtures::student(&db, &branch.id, "Asha Rao", 1000).await;
        let mut request = test_fixtures::student_request(&branch.id, "Vikram", 1000);
        request.phone = "9123456789".to_string();
        repo.create(request).await.unwrap();
        test_fixtures::student(&db, &other.id, "Zoya", 1000).await;

        let in_branch = repo
            .list(&StudentFilter {
                branch_id: Some(branch.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(in_branch.len(), 2);
        assert_eq!(in_branch[0].name, "Asha Rao");

        let by_phone = repo
            .list(&StudentFilter {
                search: Some("91234".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_phone.len(), 1);
        assert_eq!(by_phone[0].name, "Vikram");

        let by_name = repo
            .list(&StudentFilter {
                search: Some("rao".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        repo.deactivate(&asha.id).await.unwrap();
        let active = repo
            .list(&StudentFilter {
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|s| s.id != asha.id));
    }

    #[tokio::test]
    async fn test_seat_shift_pair_is_exclusive_while_active() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        let shift = test_fixtures::shift(&db, &branch.id, "Morning", 1000).await;
        let seat = test_fixtures::seat(&db, &branch.id, "A1").await;
        let repo = StudentRepository::new(db.pool());

        let allocated = |name: &str| {
            let mut request = test_fixtures::student_request(&branch.id, name, 1000);
            request.seat_id = Some(seat.id.clone());
            request.shift_id = Some(shift.id.clone());
            request
        };

        let first = repo.create(allocated("First")).await.unwrap();
        let err = repo.create(allocated("Second")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        repo.deactivate(&first.id).await.unwrap();
        let second = repo.create(allocated("Second")).await.unwrap();
        assert_eq!(second.seat_id.as_deref(), Some(seat.id.as_str()));
    }

    #[tokio::test]
    async fn test_update_clears_allocation() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        let shift = test_fixtures::shift(&db, &branch.id, "Morning", 1000).await;
        let seat = test_fixtures::seat(&db, &branch.id, "A1").await;
        let repo = StudentRepository::new(db.pool());

        let mut request = test_fixtures::student_request(&branch.id, "Meera", 1000);
        request.seat_id = Some(seat.id.clone());
        request.shift_id = Some(shift.id.clone());
        let student = repo.create(request).await.unwrap();

        let updated = repo
            .update(
                &student.id,
                UpdateStudentRequest {
                    seat_id: Some(None),
                    shift_id: Some(None),
                    monthly_fee: Some(1200),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.seat_id.is_none());
        assert!(updated.shift_id.is_none());
        assert_eq!(updated.monthly_fee, 1200);
        assert_eq!(updated.name, "Meera");
    }

    #[tokio::test]
    async fn test_update_missing_and_empty() {
        let db = Db::in_memory().await.unwrap();
        let repo = StudentRepository::new(db.pool());

        let missing = repo
            .update(
                "nope",
                UpdateStudentRequest {
                    name: Some("X".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let empty = repo.update("nope", UpdateStudentRequest::default()).await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        assert!(matches!(repo.deactivate("nope").await, Err(Error::NotFound(_))));
    }
}
