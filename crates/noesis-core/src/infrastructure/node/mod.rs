//! SQLite-backed knowledge node persistence

mod repository;

pub use repository::SqliteNodeRepository;
