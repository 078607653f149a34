//! ABOUTME: SQLite pool, embedded schema migrations and table statistics
//! ABOUTME: Handles all data persistence and report aggregation queries

use sd_core::{Error, Result};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Row, Sqlite, SqlitePool,
};
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Allowed table names for statistics queries
/// Table names cannot be bound as parameters, so only these are ever formatted into SQL
const ALLOWED_TABLES: &[&str] = &[
    "branches",
    "users",
    "shifts",
    "seats",
    "students",
    "transactions",
    "expenses",
];

/// Validates that a table name contains only safe SQL identifier characters
fn is_safe_sql_identifier(table: &str) -> bool {
    let mut chars = table.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Connection pool tuning
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub pool_size: u32,
    pub sqlite_wal: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            pool_size: 10,
            sqlite_wal: true,
        }
    }
}

/// Database connection pool and operations
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_options(db_path, DbOptions::default()).await
    }

    /// Open the database with explicit pool options
    #[instrument(skip(db_path))]
    pub async fn with_options(db_path: &str, options: DbOptions) -> Result<Self> {
        info!("Initializing database at: {}", db_path);

        let database_url = format!("sqlite://{}", db_path);
        if !Sqlite::database_exists(&database_url)
            .await
            .unwrap_or(false)
        {
            info!("Creating database: {}", database_url);
            Sqlite::create_database(&database_url)
                .await
                .map_err(|e| Error::Database(format!("Failed to create database: {}", e)))?;
        }

        let journal_mode = if options.sqlite_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(journal_mode)
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("synchronous", "NORMAL")
            .pragma("busy_timeout", "30000");

        let pool = SqlitePoolOptions::new()
            .max_connections(options.pool_size)
            .min_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::Database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    /// Migrated in-memory database on a single pinned connection
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::Database(format!("Invalid in-memory options: {}", e)))?
            .foreign_keys(true);

        // Every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run database migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing database health check");

        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Row counts for every application table, gathered in one round trip
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DatabaseStats> {
        if let Some(bad) = ALLOWED_TABLES.iter().find(|t| !is_safe_sql_identifier(t)) {
            return Err(Error::Database(format!("Refusing to count table '{}'", bad)));
        }

        let query = ALLOWED_TABLES
            .iter()
            .map(|table| format!("SELECT '{0}' AS name, COUNT(*) AS count FROM {0}", table))
            .collect::<Vec<_>>()
            .join(" UNION ALL ");

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count rows: {}", e)))?;

        let table_counts = rows
            .iter()
            .map(|row| (row.get::<String, _>("name"), row.get::<i64, _>("count")))
            .collect();

        debug!(tables = ALLOWED_TABLES.len(), "Gathered table counts");
        Ok(DatabaseStats { table_counts })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub table_counts: std::collections::BTreeMap<String, i64>,
}

/// Map a sqlx error onto the core error, surfacing constraint violations
pub(crate) fn db_error(context: &str, error: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.is_unique_violation() {
            return Error::Conflict(format!("{}: record already exists", context));
        }
        if db_err.is_foreign_key_violation() {
            return Error::Conflict(format!("{}: referenced record is missing or in use", context));
        }
        if db_err.is_check_violation() {
            return Error::Validation(format!("{}: {}", context, db_err.message()));
        }
    }
    Error::Database(format!("{}: {}", context, error))
}

pub mod repositories;

pub use repositories::{
    branches::{Branch, BranchRepository, CreateBranchRequest, UpdateBranchRequest},
    expenses::{CreateExpenseRequest, Expense, ExpenseFilter, ExpenseRepository, UpdateExpenseRequest},
    reports::{AmountByKey, DashboardSummary, DuesReport, ProfitLoss, ReportRepository, StudentDue},
    seats::{CreateSeatRequest, Seat, SeatAvailability, SeatRepository, UpdateSeatRequest},
    shifts::{CreateShiftRequest, Shift, ShiftRepository, UpdateShiftRequest},
    students::{CreateStudentRequest, Student, StudentFilter, StudentRepository, UpdateStudentRequest},
    transactions::{CreateTransactionRequest, Transaction, TransactionFilter, TransactionRepository},
    users::{CreateUserRequest, UpdateUserRequest, User, UserRepository},
};


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_initialization() {
        let db = Db::in_memory().await.expect("Failed to create test database");

        db.health_check().await.expect("Health check should pass");

        let stats = db.stats().await.expect("Stats should be available");
        for &table in ALLOWED_TABLES {
            assert_eq!(stats.table_counts[table], 0, "{} should start empty", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Db::in_memory().await.expect("Failed to create test database");
        db.migrate().await.expect("Migrations should re-run cleanly");
    }

    #[tokio::test]
    async fn test_file_database_created_on_demand() {
        let path = std::env::temp_dir().join(format!("seatdesk_test_{}.db", sd_core::Id::new()));
        let path_str = path.to_string_lossy().to_string();

        let db = Db::with_options(
            &path_str,
            DbOptions {
                pool_size: 2,
                sqlite_wal: false,
            },
        )
        .await
        .expect("Failed to create file database");
        db.health_check().await.expect("Health check should pass");
        drop(db);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_safe_sql_identifier_validation() {
        assert!(is_safe_sql_identifier("students"));
        assert!(is_safe_sql_identifier("_private"));
        assert!(is_safe_sql_identifier("table123"));

        assert!(!is_safe_sql_identifier(""));
        assert!(!is_safe_sql_identifier("1users"));
        assert!(!is_safe_sql_identifier("user-table"));
        assert!(!is_safe_sql_identifier("users; DROP TABLE users"));
        assert!(!is_safe_sql_identifier("users' OR '1'='1"));
    }

    #[test]
    fn test_allowed_tables_are_safe() {
        for &table in ALLOWED_TABLES {
            assert!(is_safe_sql_identifier(table), "unsafe identifier: {}", table);
        }
    }
}
