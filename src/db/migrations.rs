use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<(), MigrationError> {
    // Create migrations table if it doesn't exist
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    let migrations: Vec<(&str, &str)> = vec![("001_posts", MIGRATION_001_POSTS)];

    for (name, sql) in migrations {
        if !migration_applied(conn, name)? {
            conn.execute_batch(sql)?;
            mark_migration_applied(conn, name)?;
            log::debug!("Applied migration {}", name);
        }
    }

    Ok(())
}

fn migration_applied(conn: &Connection, name: &str) -> Result<bool, MigrationError> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM _migrations WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn mark_migration_applied(conn: &Connection, name: &str) -> Result<(), MigrationError> {
    conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
    Ok(())
}

const MIGRATION_001_POSTS: &str = r#"
CREATE TABLE posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    date_posted DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX idx_posts_title ON posts(title);
"#;
