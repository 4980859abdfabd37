// Fit-quality metrics
pub mod metrics;

// Sequence models and their persisted schema
pub mod model;

// The train-or-reuse-then-forecast pipeline
pub mod pipeline;

// Min-max normalization
pub mod scaler;

// Supervised window generation
pub mod windows;
