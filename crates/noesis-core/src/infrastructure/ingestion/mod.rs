//! SQLite-backed ingestion record persistence

mod repository;

pub use repository::SqliteIngestionRepository;
