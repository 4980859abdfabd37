// Shared HTTP client construction
pub mod http_client;

// Market data providers
pub mod market_data;

// SQLite-backed model persistence
pub mod persistence;
