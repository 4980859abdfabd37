//! Sequence models: a trainable function from a fixed-length normalized
//! window to the next scalar.
//!
//! The persisted form is a versioned, explicit schema: an enumerated
//! [`Architecture`] tag plus a fixed-order list of flat weight arrays.
//! Loading never reconstructs a dynamic graph from opaque strings; an
//! unrecognized tag or a weight layout that disagrees with the tag is a
//! `CacheIncompatible` error.

mod echo_state;

pub use echo_state::EchoStateNet;

use crate::domain::errors::ForecastError;
use crate::domain::types::CachedModel;
use crate::application::windows::Window;
use serde::{Deserialize, Serialize};

/// Bump when the persisted layout changes; rows written under a different
/// version are rejected at load time instead of silently misread.
pub const MODEL_SCHEMA_VERSION: i64 = 1;

/// Enumerated model architecture with its structural hyperparameters.
/// Together with the weight arrays this fully determines inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Architecture {
    EchoState {
        lookback: usize,
        reservoir_size: usize,
        spectral_radius: f64,
        input_scaling: f64,
        sparsity: f64,
        leak_rate: f64,
    },
}

/// Serializable snapshot of a model: tag + weights, nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBlob {
    pub architecture: Architecture,
    pub weights: Vec<Vec<f64>>,
}

/// Structural hyperparameters for freshly trained models.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub reservoir_size: usize,
    pub spectral_radius: f64,
    pub input_scaling: f64,
    pub sparsity: f64,
    pub leak_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            reservoir_size: 64,
            spectral_radius: 0.9,
            input_scaling: 0.1,
            sparsity: 0.1,
            leak_rate: 0.3,
        }
    }
}

/// Optimizer budget for one training run. `seed` fixes weight
/// initialization for reproducible tests; production runs leave it unset.
#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 300,
            learning_rate: 0.01,
            seed: None,
        }
    }
}

/// Interface for trainable sequence models
pub trait SequenceModel: Send + Sync + std::fmt::Debug {
    /// Window length the model was built for.
    fn lookback(&self) -> usize;

    /// Fit internal parameters to the (window, target) batch by minimizing
    /// mean-squared error for the configured epoch budget.
    fn train(&mut self, windows: &[Window], cfg: &TrainingConfig) -> Result<(), ForecastError>;

    /// Next-step prediction. Pure: no hidden state survives the call, so
    /// repeated invocations with the same window are bit-identical.
    fn predict(&self, window: &[f64]) -> Result<f64, ForecastError>;

    /// Snapshot for persistence.
    fn to_blob(&self) -> ModelBlob;
}

/// Fresh untrained model for the configured architecture.
pub fn new_model(lookback: usize, cfg: &ModelConfig, seed: Option<u64>) -> Box<dyn SequenceModel> {
    Box::new(EchoStateNet::new(lookback, cfg, seed))
}

/// Rebuild a model from a cache row, validating tag and weight layout.
pub fn from_cached(cached: &CachedModel) -> Result<Box<dyn SequenceModel>, ForecastError> {
    let arch: Architecture = serde_json::from_str(&cached.architecture).map_err(|e| {
        ForecastError::CacheIncompatible {
            reason: format!("unreadable architecture tag: {e}"),
        }
    })?;

    match arch {
        Architecture::EchoState { lookback, .. } => {
            if lookback != cached.lookback {
                return Err(ForecastError::CacheIncompatible {
                    reason: format!(
                        "architecture lookback {} disagrees with record lookback {}",
                        lookback, cached.lookback
                    ),
                });
            }
            Ok(Box::new(EchoStateNet::from_blob(&arch, &cached.weights)?))
        }
    }
}
