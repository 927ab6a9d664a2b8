//! SQLite-backed relationship graph persistence

mod repository;

pub use repository::SqliteGraphRepository;
