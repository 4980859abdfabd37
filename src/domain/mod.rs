// Domain-specific error types
pub mod errors;

// Port interfaces
pub mod ports;

// Core forecasting domain types
pub mod types;
