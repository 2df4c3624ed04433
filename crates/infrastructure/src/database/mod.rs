pub mod sqlite;

pub use sqlite::{DatabaseManager, SqliteClusterRegistry, SqliteOffsetStore};
