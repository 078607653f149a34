//! ABOUTME: User repository with authentication and account management operations
//! ABOUTME: Back-office accounts carry a role and an optional home branch

use crate::db_error;
use sd_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, branch_id, is_active, created_at, updated_at";

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub branch_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Request to create a new user
#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub branch_id: Option<String>,
}

/// Request to update a user; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<String>,
    pub branch_id: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
            && self.branch_id.is_none()
            && self.is_active.is_none()
    }
}

/// User repository
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<User> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating user with id: {}", id);

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, branch_id, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.username)
        .bind(request.email)
        .bind(request.password_hash)
        .bind(request.role)
        .bind(request.branch_id)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to create user", e))?;

        debug!("Successfully created user: {}", user.id);
        Ok(user)
    }

    /// Find a user by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| db_error("Failed to find user by id", e))
    }

    /// Find a user by username
    #[instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| db_error("Failed to find user by username", e))
    }

    /// Find a user by email (case-insensitive)
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| db_error("Failed to find user by email", e))
    }

    /// List every user, active ones first
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY is_active DESC, username ASC"
        ))
        .fetch_all(self.pool)
        .await
        .map_err(|e| db_error("Failed to list users", e))?;

        debug!("Found {} users", users.len());
        Ok(users)
    }

    /// Update a user
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: UpdateUserRequest) -> Result<User> {
        debug!("Updating user: {}", id);

        if request.is_empty() {
            return Err(Error::Validation("No fields to update".to_string()));
        }

        let now = now_iso8601();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let current = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to find user by id", e))?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = ?1, email = ?2, password_hash = ?3, role = ?4, branch_id = ?5,
                is_active = ?6, updated_at = ?7
            WHERE id = ?8
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(request.username.unwrap_or(current.username))
        .bind(request.email.unwrap_or(current.email))
        .bind(request.password_hash.unwrap_or(current.password_hash))
        .bind(request.role.unwrap_or(current.role))
        .bind(request.branch_id.unwrap_or(current.branch_id))
        .bind(request.is_active.unwrap_or(current.is_active))
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update user", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        debug!("Successfully updated user: {}", user.id);
        Ok(user)
    }

    /// Soft delete - mark as inactive
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ?1 WHERE id = ?2")
            .bind(now_iso8601())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| db_error("Failed to deactivate user", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("User not found".to_string()));
        }

        debug!("Deactivated user: {}", id);
        Ok(())
    }

    /// Whether any account exists, active or not
    #[instrument(skip(self))]
    pub async fn has_any_users(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await
            .map_err(|e| db_error("Failed to count users", e))?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_fixtures, Db};

    fn request(username: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hashed_password".to_string(),
            role: "staff".to_string(),
            branch_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = Db::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let user = repo
            .create(request("desk1", "desk1@example.com"))
            .await
            .expect("Failed to create user");

        assert!(!user.id.is_empty());
        assert_eq!(user.role, "staff");
        assert!(user.is_active);

        let by_id = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "desk1");

        let by_name = repo.find_by_username("desk1").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);

        let by_email = repo.find_by_email("DESK1@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let db = Db::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.create(request("a", "same@example.com")).await.unwrap();
        let err = repo
            .create(request("b", "same@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_role_rejected_by_schema() {
        let db = Db::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        let mut bad = request("c", "c@example.com");
        bad.role = "superuser".to_string();

        assert!(matches!(repo.create(bad).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_clear_branch() {
        let db = Db::in_memory().await.unwrap();
        let branch = test_fixtures::branch(&db).await;
        let repo = UserRepository::new(db.pool());
        let user = repo.create(request("m", "m@example.com")).await.unwrap();

        let updated = repo
            .update(
                &user.id,
                UpdateUserRequest {
                    role: Some("manager".to_string()),
                    branch_id: Some(Some(branch.id.clone())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, "manager");
        assert_eq!(updated.branch_id.as_deref(), Some(branch.id.as_str()));
        assert_eq!(updated.email, "m@example.com");

        let cleared = repo
            .update(
                &user.id,
                UpdateUserRequest {
                    branch_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.branch_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_update_rejected() {
        let db = Db::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        let user = repo.create(request("e", "e@example.com")).await.unwrap();

        let err = repo
            .update(&user.id, UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_deactivate_and_has_any_users() {
        let db = Db::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        assert!(!repo.has_any_users().await.unwrap());

        let user = repo.create(request("d", "d@example.com")).await.unwrap();
        assert!(repo.has_any_users().await.unwrap());

        // A disabled account still counts; first-run setup must not reopen
        repo.deactivate(&user.id).await.unwrap();
        assert!(repo.has_any_users().await.unwrap());
        assert!(!repo.find_by_id(&user.id).await.unwrap().unwrap().is_active);

        assert!(matches!(
            repo.deactivate("missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: "1".into(),
            username: "u".into(),
            email: "u@example.com".into(),
            password_hash: "secret".into(),
            role: "staff".into(),
            branch_id: None,
            is_active: true,
            created_at: "now".into(),
            updated_at: "now".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["isActive"], true);
    }
}
