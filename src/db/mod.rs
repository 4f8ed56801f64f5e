pub mod connection;
pub mod migrations;
pub mod posts;

pub use connection::{DbError, DbPool};
pub use posts::{PostDbError, PostRepository};
