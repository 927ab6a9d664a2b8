//! SQLite-backed model version persistence

mod repository;

pub use repository::SqliteModelVersionRepository;
