//! Post storage
//!
//! Free functions operate on a single connection. [`PostRepository`] wraps
//! the pool and reports every save and delete to the index sync registry.

use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use super::connection::DbPool;
use crate::models::{CreatePostInput, Post, Record, UpdatePostInput};
use crate::search::{resolve, IndexManager, RecordStore, SearchError, SyncRegistry};

#[derive(Error, Debug)]
pub enum PostDbError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] r2d2::Error),
    #[error("Post not found: {0}")]
    NotFound(i64),
    #[error("Posts are not registered for indexing")]
    NotRegistered,
    #[error("Search index error: {0}")]
    IndexError(#[from] SearchError),
}

const POST_COLUMNS: &str = "id, title, body, date_posted";

/// Parse a datetime string from SQLite into a DateTime<Utc>
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // SQLite's default format
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn now_string() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Map a database row to a Post struct
fn row_to_post(row: &Row) -> Result<Post, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let raw_date: String = row.get(3)?;
    // A bad timestamp would be mirrored into the index, so the row is rejected
    let date_posted = parse_datetime(&raw_date).map_err(|e| {
        log::warn!("Post {} has unparsable date_posted {:?}: {}", id, raw_date, e);
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
    })?;

    Ok(Post {
        id,
        title: row.get(1)?,
        body: row.get(2)?,
        date_posted,
    })
}

/// Create a new post
pub fn create_post(conn: &Connection, input: CreatePostInput) -> Result<Post, PostDbError> {
    conn.execute(
        "INSERT INTO posts (title, body, date_posted) VALUES (?1, ?2, ?3)",
        params![input.title, input.body, now_string()],
    )?;

    let id = conn.last_insert_rowid();
    get_post(conn, id)?.ok_or(PostDbError::NotFound(id))
}

/// Get a post by ID
pub fn get_post(conn: &Connection, id: i64) -> Result<Option<Post>, PostDbError> {
    let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
    let post = conn.query_row(&sql, [id], row_to_post).optional()?;
    Ok(post)
}

/// Get all posts ordered by id
pub fn get_all_posts(conn: &Connection) -> Result<Vec<Post>, PostDbError> {
    let sql = format!("SELECT {} FROM posts ORDER BY id", POST_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;

    let posts = stmt
        .query_map([], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

/// Get posts whose title equals `title`
pub fn filter_posts_by_title(conn: &Connection, title: &str) -> Result<Vec<Post>, PostDbError> {
    let sql = format!("SELECT {} FROM posts WHERE title = ?1 ORDER BY id", POST_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;

    let posts = stmt
        .query_map([title], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

/// Get posts whose id is in `ids`, ordered by id.
/// Ids that are not integers match nothing.
pub fn filter_posts_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<Post>, PostDbError> {
    let values: Rc<Vec<Value>> = Rc::new(
        ids.iter()
            .filter_map(|id| id.parse::<i64>().ok())
            .map(Value::from)
            .collect(),
    );

    let sql = format!(
        "SELECT {} FROM posts WHERE id IN rarray(?1) ORDER BY id",
        POST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let posts = stmt
        .query_map([values], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

/// Update an existing post; `date_posted` is refreshed on every save
pub fn update_post(
    conn: &Connection,
    id: i64,
    input: UpdatePostInput,
) -> Result<Post, PostDbError> {
    // First check if the post exists
    let existing = get_post(conn, id)?.ok_or(PostDbError::NotFound(id))?;

    let title = input.title.unwrap_or(existing.title);
    let body = input.body.unwrap_or(existing.body);

    conn.execute(
        "UPDATE posts SET title = ?1, body = ?2, date_posted = ?3 WHERE id = ?4",
        params![title, body, now_string(), id],
    )?;

    get_post(conn, id)?.ok_or(PostDbError::NotFound(id))
}

/// Delete a post
pub fn delete_post(conn: &Connection, id: i64) -> Result<bool, PostDbError> {
    let rows_affected = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
    Ok(rows_affected > 0)
}

/// Post store that reports lifecycle events to the index sync registry
pub struct PostRepository {
    pool: DbPool,
    registry: Arc<SyncRegistry>,
}

impl std::fmt::Debug for PostRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostRepository").finish_non_exhaustive()
    }
}

impl PostRepository {
    pub fn new(pool: DbPool, registry: Arc<SyncRegistry>) -> Self {
        Self { pool, registry }
    }

    fn index_manager(&self) -> Result<Arc<IndexManager>, PostDbError> {
        self.registry
            .manager(Post::TYPE_NAME)
            .ok_or(PostDbError::NotRegistered)
    }

    /// Insert a post, then index it if posts sync in real time
    pub fn create(&self, input: CreatePostInput) -> Result<Post, PostDbError> {
        let conn = self.pool.get()?;
        let post = create_post(&conn, input)?;
        self.registry.record_saved(&post, true)?;
        Ok(post)
    }

    /// Update a post, then re-index it if posts sync in real time
    pub fn update(&self, id: i64, input: UpdatePostInput) -> Result<Post, PostDbError> {
        let conn = self.pool.get()?;
        let post = update_post(&conn, id, input)?;
        self.registry.record_saved(&post, false)?;
        Ok(post)
    }

    /// Delete a post. Its index document is kept until the next rebuild.
    pub fn delete(&self, id: i64) -> Result<bool, PostDbError> {
        let conn = self.pool.get()?;
        let Some(post) = get_post(&conn, id)? else {
            return Ok(false);
        };

        let deleted = delete_post(&conn, id)?;
        self.registry.record_deleted(&post)?;
        Ok(deleted)
    }

    pub fn get(&self, id: i64) -> Result<Option<Post>, PostDbError> {
        let conn = self.pool.get()?;
        get_post(&conn, id)
    }

    pub fn all(&self) -> Result<Vec<Post>, PostDbError> {
        let conn = self.pool.get()?;
        get_all_posts(&conn)
    }

    pub fn filter_by_title(&self, title: &str) -> Result<Vec<Post>, PostDbError> {
        let conn = self.pool.get()?;
        filter_posts_by_title(&conn, title)
    }

    /// Posts matching `query` in `field`
    pub fn query(&self, field: &str, query: &str) -> Result<Vec<Post>, PostDbError> {
        let ids = self.index_manager()?.query(field, query)?;
        Ok(resolve(self, &ids)?)
    }

    /// Posts where any of `fields` matches `query`
    pub fn query_multifield(&self, fields: &[&str], query: &str) -> Result<Vec<Post>, PostDbError> {
        let ids = self.index_manager()?.query_multifield(fields, query)?;
        Ok(resolve(self, &ids)?)
    }

    /// Posts similar to post `id` in `field`
    pub fn more_like_this(
        &self,
        field: &str,
        id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Post>, PostDbError> {
        let manager = self.index_manager()?;
        Ok(manager.more_like_this(self, field, &id.to_string(), limit)?)
    }

    /// Re-index every stored post from scratch
    pub fn rebuild_index(&self) -> Result<usize, PostDbError> {
        let posts = self.all()?;
        Ok(self.index_manager()?.rebuild_index(&posts)?)
    }
}

impl RecordStore<Post> for PostRepository {
    type Error = PostDbError;

    fn filter_by_ids(&self, ids: &[String]) -> Result<Vec<Post>, PostDbError> {
        let conn = self.pool.get()?;
        filter_posts_by_ids(&conn, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::db::connection::init_test_pool;
    use crate::search::IndexDeclaration;
    use tempfile::TempDir;

    fn post_input(title: &str, body: &str) -> CreatePostInput {
        CreatePostInput {
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    fn create_repository(declaration: IndexDeclaration) -> (PostRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(SyncRegistry::new(IndexConfig::new(
            temp_dir.path().join("index"),
        )));
        registry.register_record::<Post>(declaration).unwrap();

        let pool = init_test_pool().unwrap();
        (PostRepository::new(pool, registry), temp_dir)
    }

    fn seeded_repository() -> (PostRepository, TempDir) {
        let (repo, dir) = create_repository(
            IndexDeclaration::new(["title", "body"]).with_default_field("title"),
        );
        repo.create(post_input("first post", "This is my very first post ever in the world!"))
            .unwrap();
        repo.create(post_input("second post", "This is now the second post that I have indexed!"))
            .unwrap();
        repo.create(post_input("third post", "Whoah")).unwrap();
        (repo, dir)
    }

    #[test]
    fn test_create_and_get_post() {
        let pool = init_test_pool().unwrap();
        let conn = pool.get().unwrap();

        let post = create_post(&conn, post_input("Test Post", "Test body")).unwrap();
        assert_eq!(post.title, "Test Post");

        let fetched = get_post(&conn, post.id).unwrap().unwrap();
        assert_eq!(fetched, post);
    }

    #[test]
    fn test_update_post() {
        let pool = init_test_pool().unwrap();
        let conn = pool.get().unwrap();

        let post = create_post(&conn, post_input("Original Title", "Body")).unwrap();
        let update = UpdatePostInput {
            title: Some("Updated Title".to_string()),
            body: None,
        };

        let updated = update_post(&conn, post.id, update).unwrap();
        assert_eq!(updated.title, "Updated Title");
        assert_eq!(updated.body, "Body");

        let missing = update_post(&conn, 999, UpdatePostInput::default());
        assert!(matches!(missing, Err(PostDbError::NotFound(999))));
    }

    #[test]
    fn test_corrupt_date_is_rejected() {
        let pool = init_test_pool().unwrap();
        let conn = pool.get().unwrap();

        let post = create_post(&conn, post_input("Dated", "Body")).unwrap();
        conn.execute(
            "UPDATE posts SET date_posted = 'not a date' WHERE id = ?1",
            [post.id],
        )
        .unwrap();

        let err = get_post(&conn, post.id).unwrap_err();
        assert!(matches!(
            err,
            PostDbError::SqliteError(rusqlite::Error::FromSqlConversionFailure(3, _, _))
        ));
    }

    #[test]
    fn test_filter_posts_by_ids() {
        let pool = init_test_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = create_post(&conn, post_input("a", "x")).unwrap();
        let b = create_post(&conn, post_input("b", "x")).unwrap();
        let c = create_post(&conn, post_input("c", "x")).unwrap();

        let ids = vec![c.id.to_string(), a.id.to_string(), "not-a-number".to_string()];
        let posts = filter_posts_by_ids(&conn, &ids).unwrap();
        let found: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(found, vec![a.id, c.id]);
        assert!(!found.contains(&b.id));

        assert!(filter_posts_by_ids(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_matches_direct_filter() {
        let (repo, _dir) = seeded_repository();

        assert_eq!(
            repo.query("title", "first").unwrap(),
            repo.filter_by_title("first post").unwrap()
        );
        assert_eq!(repo.query("title", "post").unwrap(), repo.all().unwrap());
    }

    #[test]
    fn test_query_multifield() {
        let (repo, _dir) = seeded_repository();

        let posts = repo.query_multifield(&["title", "body"], "indexed").unwrap();
        assert_eq!(posts, repo.filter_by_title("second post").unwrap());
    }

    #[test]
    fn test_update_reindexes() {
        let (repo, _dir) = seeded_repository();
        let first = repo.filter_by_title("first post").unwrap().remove(0);

        let update = UpdatePostInput {
            title: Some("opening entry".to_string()),
            body: None,
        };
        repo.update(first.id, update).unwrap();

        assert!(repo.query("title", "first").unwrap().is_empty());
        let found = repo.query("title", "opening").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, first.id);
    }

    #[test]
    fn test_deleted_post_stays_indexed_but_unresolved() {
        let (repo, _dir) = seeded_repository();
        let third = repo.filter_by_title("third post").unwrap().remove(0);

        assert!(repo.delete(third.id).unwrap());
        assert!(!repo.delete(third.id).unwrap());

        let manager = repo.index_manager().unwrap();
        assert_eq!(manager.query("title", "third").unwrap(), vec![third.id.to_string()]);
        assert!(repo.query("title", "third").unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_index_drops_deleted_posts() {
        let (repo, _dir) = seeded_repository();
        let third = repo.filter_by_title("third post").unwrap().remove(0);
        repo.delete(third.id).unwrap();

        assert_eq!(repo.rebuild_index().unwrap(), 2);
        let manager = repo.index_manager().unwrap();
        assert!(manager.query("title", "third").unwrap().is_empty());

        assert_eq!(repo.rebuild_index().unwrap(), 2);
        assert_eq!(repo.query("title", "post").unwrap().len(), 2);
    }

    #[test]
    fn test_manual_sync_skips_saves() {
        let (repo, _dir) =
            create_repository(IndexDeclaration::new(["title"]).with_real_time(false));
        repo.create(post_input("unsynced post", "body")).unwrap();

        assert!(repo.query("title", "unsynced").unwrap().is_empty());

        assert_eq!(repo.rebuild_index().unwrap(), 1);
        assert_eq!(repo.query("title", "unsynced").unwrap().len(), 1);
    }

    #[test]
    fn test_query_without_registration() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(SyncRegistry::new(IndexConfig::new(temp_dir.path())));
        let repo = PostRepository::new(init_test_pool().unwrap(), registry);

        repo.create(post_input("plain", "body")).unwrap();
        assert!(matches!(
            repo.query("title", "plain"),
            Err(PostDbError::NotRegistered)
        ));
    }

    #[test]
    fn test_keywords_and_more_like_this() {
        let (repo, _dir) = create_repository(IndexDeclaration::new(["title", "body"]));
        let rust = repo
            .create(post_input("rust", "ownership borrowing ownership lifetimes"))
            .unwrap();
        let borrow = repo
            .create(post_input("borrow", "borrowing rules and lifetimes"))
            .unwrap();
        repo.create(post_input("garden", "tomatoes and basil")).unwrap();

        let manager = repo.index_manager().unwrap();
        let keywords = manager.keywords_for("body", &rust.id.to_string(), 1).unwrap();
        assert_eq!(keywords, vec!["ownership"]);

        let similar = repo.more_like_this("body", rust.id, None).unwrap();
        assert_eq!(similar, vec![borrow]);
    }
}
