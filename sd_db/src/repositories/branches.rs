//! ABOUTME: Branch repository for library locations
//! ABOUTME: Branches scope students, seats, shifts, collections and expenses

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const BRANCH_COLUMNS: &str = "id, name, address, phone, created_at, updated_at";

/// Branch entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateBranchRequest {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBranchRequest {
    pub name: Option<String>,
    pub address: Option<Option<String>>,
    pub phone: Option<Option<String>>,
}

pub struct BranchRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BranchRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateBranchRequest) -> Result<Branch> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating branch {}", request.name);

        sqlx::query_as::<_, Branch>(&format!(
            r#"
            INSERT INTO branches (id, name, address, phone, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING {BRANCH_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.name)
        .bind(request.address)
        .bind(request.phone)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to create branch", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Branch>> {
        sqlx::query_as::<_, Branch>(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| db_error("Failed to find branch", e))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Branch>> {
        sqlx::query_as::<_, Branch>(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches ORDER BY name ASC"
        ))
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list branches", e))
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateBranchRequest) -> Result<Branch> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound("Branch not found".to_string()))?;

        sqlx::query_as::<_, Branch>(&format!(
            r#"
            UPDATE branches SET name = ?1, address = ?2, phone = ?3, updated_at = ?4
            WHERE id = ?5
            RETURNING {BRANCH_COLUMNS}
            "#
        ))
        .bind(request.name.unwrap_or(current.name))
        .bind(request.address.unwrap_or(current.address))
        .bind(request.phone.unwrap_or(current.phone))
        .bind(now_iso8601())
        .bind(id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to update branch", e))
    }

    /// Hard delete; fails with `Conflict` while anything still references the branch
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM branches WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| db_error("Failed to delete branch", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Branch not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_fixtures, Db};

    #[tokio::test]
    async fn test_branch_crud() {
        let db = Db::in_memory().await.unwrap();
        let repo = BranchRepository::new(db.pool());

        let branch = repo
            .create(CreateBranchRequest {
                name: "Central".to_string(),
                address: None,
                phone: Some("0800".to_string()),
            })
            .await
            .unwrap();

        let updated = repo
            .update(
                &branch.id,
                UpdateBranchRequest {
                    address: Some(Some("1 Main St".to_string())),
                    phone: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Central");
        assert_eq!(updated.address.as_deref(), Some("1 Main St"));
        assert!(updated.phone.is_none());

        assert_eq!(repo.list().await.unwrap().len(), 1);

        repo.delete(&branch.id).await.unwrap();
        assert!(repo.find_by_id(&branch.id).await.unwrap().is_none());
        assert!(matches!(repo.delete(&branch.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let db = Db::in_memory().await.unwrap();
        let repo = BranchRepository::new(db.pool());
        let request = CreateBranchRequest {
            name: "North".to_string(),
            address: None,
            phone: None,
        };

        repo.create(request.clone()).await.unwrap();
        assert!(matches!(repo.create(request).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_referenced_branch_is_conflict() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        test_fixtures::seat(&db, &branch.id, "A1").await;

        let err = BranchRepository::new(db.pool())
            .delete(&branch.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
