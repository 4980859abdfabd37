//! Configuration module for stockcast.
//!
//! Structured configuration loading from environment variables: provider
//! mode, storage location and model knobs.

use crate::application::model::{ModelConfig, TrainingConfig};
use crate::application::pipeline::PipelineConfig;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Market data provider mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Alpaca,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "alpaca" => Ok(Mode::Alpaca),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'alpaca'", s),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub database_url: String,

    // Alpaca data API
    pub alpaca_api_key: String,
    pub alpaca_secret_key: String,
    pub alpaca_data_url: String,

    // Model knobs
    pub lookback: usize,
    pub train_split: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub reservoir_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode_str = env::var("MODE").unwrap_or_else(|_| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let config = Self {
            mode,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/stockcast.db".to_string()),
            alpaca_api_key: env::var("ALPACA_API_KEY").unwrap_or_default(),
            alpaca_secret_key: env::var("ALPACA_SECRET_KEY").unwrap_or_default(),
            alpaca_data_url: env::var("ALPACA_DATA_URL")
                .unwrap_or_else(|_| "https://data.alpaca.markets".to_string()),
            lookback: Self::parse_usize("LOOKBACK", 60)?,
            train_split: Self::parse_f64("TRAIN_SPLIT", 0.7)?,
            epochs: Self::parse_usize("TRAIN_EPOCHS", 300)?,
            learning_rate: Self::parse_f64("LEARNING_RATE", 0.01)?,
            reservoir_size: Self::parse_usize("RESERVOIR_SIZE", 64)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lookback < 2 {
            anyhow::bail!("LOOKBACK must be at least 2, got {}", self.lookback);
        }
        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            anyhow::bail!(
                "TRAIN_SPLIT must be strictly between 0 and 1, got {}",
                self.train_split
            );
        }
        if self.epochs == 0 {
            anyhow::bail!("TRAIN_EPOCHS must be at least 1");
        }
        if !(self.learning_rate > 0.0) {
            anyhow::bail!("LEARNING_RATE must be positive, got {}", self.learning_rate);
        }
        if self.reservoir_size == 0 {
            anyhow::bail!("RESERVOIR_SIZE must be at least 1");
        }
        if self.mode == Mode::Alpaca && self.alpaca_api_key.is_empty() {
            anyhow::bail!("ALPACA_API_KEY is required in alpaca mode");
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            lookback: self.lookback,
            train_split: self.train_split,
            model: ModelConfig {
                reservoir_size: self.reservoir_size,
                ..ModelConfig::default()
            },
            training: TrainingConfig {
                epochs: self.epochs,
                learning_rate: self.learning_rate,
                seed: None,
            },
        }
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
