mod database;
mod model_repository;

pub use database::Database;
pub use model_repository::SqliteModelCache;
