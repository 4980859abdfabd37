use thiserror::Error;

/// Errors surfaced by the forecasting pipeline and its collaborators.
///
/// Every variant carries the values that made the operation fail so the
/// rendered message is actionable without a debugger.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("No market data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Insufficient data: got {actual} points, need at least {required}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Degenerate price scale: every sample equals {value}")]
    DegenerateScale { value: f64 },

    #[error("Model cache unavailable: {reason}")]
    CacheIo { reason: String },

    #[error("Cached model is incompatible: {reason}")]
    CacheIncompatible { reason: String },

    #[error("Window shape mismatch: expected {expected} points, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}
