//! SQLite-backed hierarchy persistence

mod repository;

pub use repository::SqliteHierarchyRepository;
