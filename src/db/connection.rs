use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::vtab::array;
use rusqlite::OpenFlags;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::migrations::{self, MigrationError};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to create database directory: {0}")]
    CreateDirError(#[from] std::io::Error),
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    MigrationError(#[from] MigrationError),
}

/// Initialize the database connection pool at a specific path
pub fn init_pool_at_path(db_path: &Path) -> Result<DbPool, DbError> {
    // Ensure the directory exists
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Configure SQLite connection; `rarray` backs the id-set filters
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(|conn| array::load_module(conn));

    let pool = Pool::builder().max_size(10).build(manager)?;

    // Configure the database and run migrations
    {
        let conn = pool.get()?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        // Run migrations
        migrations::run_migrations(&conn)?;
    }

    Ok(pool)
}

#[cfg(test)]
pub fn init_test_pool() -> Result<DbPool, DbError> {
    // Use in-memory database for tests
    let manager = SqliteConnectionManager::memory().with_init(|conn| array::load_module(conn));
    let pool = Pool::builder().max_size(1).build(manager)?;

    {
        let conn = pool.get()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_pool_runs_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_pool_at_path(&temp_dir.path().join("data").join("records.db")).unwrap();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
