//! ABOUTME: Fee collection repository
//! ABOUTME: A collection's branch is always taken from the paying student

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, instrument};

const TRANSACTION_SELECT: &str = r#"
    SELECT t.id, t.student_id, s.name AS student_name, t.branch_id, t.amount, t.payment_mode,
           t.for_month, t.paid_on, t.note, t.collected_by, t.created_at
    FROM transactions t
    JOIN students s ON s.id = t.student_id
"#;

/// A recorded collection, joined with the student's name for ledger views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub branch_id: String,
    pub amount: i64,
    pub payment_mode: String,
    pub for_month: String,
    pub paid_on: String,
    pub note: Option<String>,
    pub collected_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    pub student_id: String,
    pub amount: i64,
    pub payment_mode: String,
    pub for_month: String,
    pub paid_on: String,
    pub note: Option<String>,
    pub collected_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub branch_id: Option<String>,
    /// Matches `for_month`
    pub month: Option<String>,
    pub student_id: Option<String>,
}

pub struct TransactionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TransactionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a collection against a student
    #[instrument(skip(self, request), fields(student_id = %request.student_id, amount = request.amount))]
    pub async fn create(&self, request: CreateTransactionRequest) -> Result<Transaction> {
        let id = Id::new().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO transactions (id, student_id, branch_id, amount, payment_mode,
                                      for_month, paid_on, note, collected_by, created_at)
            SELECT ?1, s.id, s.branch_id, ?3, ?4, ?5, ?6, ?7, ?8, ?9
            FROM students s WHERE s.id = ?2
            "#,
        )
        .bind(&id)
        .bind(&request.student_id)
        .bind(request.amount)
        .bind(request.payment_mode)
        .bind(request.for_month)
        .bind(request.paid_on)
        .bind(request.note)
        .bind(request.collected_by)
        .bind(now_iso8601())
        .execute(self.pool)
        .await
        .map_err(|e| db_error("Failed to record collection", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Student not found".to_string()));
        }

        info!("Recorded collection {}", id);

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| Error::Database("Recorded collection vanished".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!("{TRANSACTION_SELECT} WHERE t.id = ?1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| db_error("Failed to find collection", e))
    }

    /// Newest payments first
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            {TRANSACTION_SELECT}
            WHERE (?1 IS NULL OR t.branch_id = ?1)
              AND (?2 IS NULL OR t.for_month = ?2)
              AND (?3 IS NULL OR t.student_id = ?3)
            ORDER BY t.paid_on DESC, t.created_at DESC
            "#
        ))
        .bind(filter.branch_id.as_deref())
        .bind(filter.month.as_deref())
        .bind(filter.student_id.as_deref())
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list collections", e))?;

        debug!("Found {} collections", transactions.len());
        Ok(transactions)
    }

    /// Full payment ledger of one student
    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<Transaction>> {
        self.list(&TransactionFilter {
            student_id: Some(student_id.to_string()),
            ..Default::default()
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| db_error("Failed to delete collection", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Transaction not found".to_string()));
        }
        info!("Deleted collection {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_fixtures, Db};

    #[tokio::test]
    async fn test_create_derives_branch_from_student() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        let staff = test_fixtures::user(&db, "staff", Some(&branch.id)).await;
        let student = test_fixtures::student(&db, &branch.id, "Asha", 1000).await;

        let tx = test_fixtures::collection(&db, &student.id, &staff.id, 600, "2024-03", "2024-03-02").await;

        assert_eq!(tx.branch_id, branch.id);
        assert_eq!(tx.student_name, "Asha");
        assert_eq!(tx.amount, 600);
        assert_eq!(tx.collected_by, staff.id);
    }

    #[tokio::test]
    async fn test_unknown_student_is_not_found() {
        let db = Db::in_memory().await.unwrap();
        let staff = test_fixtures::user(&db, "staff", None).await;

        let err = TransactionRepository::new(db.pool())
            .create(CreateTransactionRequest {
                student_id: "missing".to_string(),
                amount: 100,
                payment_mode: "upi".to_string(),
                for_month: "2024-03".to_string(),
                paid_on: "2024-03-01".to_string(),
                note: None,
                collected_by: staff.id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_non_positive_amount_and_bad_mode_rejected() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        let staff = test_fixtures::user(&db, "staff", None).await;
        let student = test_fixtures::student(&db, &branch.id, "Asha", 1000).await;
        let repo = TransactionRepository::new(db.pool());

        let base = CreateTransactionRequest {
            student_id: student.id.clone(),
            amount: 0,
            payment_mode: "cash".to_string(),
            for_month: "2024-03".to_string(),
            paid_on: "2024-03-01".to_string(),
            note: None,
            collected_by: staff.id.clone(),
        };
        assert!(matches!(repo.create(base.clone()).await, Err(Error::Validation(_))));

        let cheque = CreateTransactionRequest {
            amount: 10,
            payment_mode: "cheque".to_string(),
            ..base
        };
        assert!(matches!(repo.create(cheque).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_filters_and_delete() {
        let db = Db::in_memory().await.unwrap();
        let north = test_fixtures::branch(&db).await;
        let south = test_fixtures::branch(&db).await;
        let staff = test_fixtures::user(&db, "admin", None).await;
        let a = test_fixtures::student(&db, &north.id, "A", 1000).await;
        let b = test_fixtures::student(&db, &south.id, "B", 1000).await;

        let march = test_fixtures::collection(&db, &a.id, &staff.id, 500, "2024-03", "2024-03-05").await;
        test_fixtures::collection(&db, &a.id, &staff.id, 500, "2024-04", "2024-04-01").await;
        test_fixtures::collection(&db, &b.id, &staff.id, 700, "2024-03", "2024-03-09").await;

        let repo = TransactionRepository::new(db.pool());

        let north_march = repo
            .list(&TransactionFilter {
                branch_id: Some(north.id.clone()),
                month: Some("2024-03".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(north_march.len(), 1);
        assert_eq!(north_march[0].id, march.id);

        let ledger = repo.list_for_student(&a.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].for_month, "2024-04");

        repo.delete(&march.id).await.unwrap();
        assert_eq!(repo.list_for_student(&a.id).await.unwrap().len(), 1);
        assert!(matches!(repo.delete(&march.id).await, Err(Error::NotFound(_))));
    }
}
