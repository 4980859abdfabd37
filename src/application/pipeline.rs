//! Train-or-reuse-then-forecast pipeline.
//!
//! Per request: cache lookup → fetch → chronological split → train →
//! evaluate → persist → autoregressive rollout → de-scale and date-align.
//! Requests for the same (symbol, end_date) key are serialized through a
//! per-key guard so a cache miss is trained exactly once; the second caller
//! finds the stored model and loads it.

use crate::application::metrics::r2_score;
use crate::application::model::{self, ModelConfig, SequenceModel, TrainingConfig};
use crate::application::scaler::MinMaxScaler;
use crate::application::windows::make_windows;
use crate::domain::errors::ForecastError;
use crate::domain::ports::{MarketDataSource, ModelCache};
use crate::domain::types::{
    CachedModel, ForecastOutcome, ForecastPoint, ForecastRequest, ModelSource, PriceSeries,
    forecast_dates, round_price,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window length fed to the model.
    pub lookback: usize,
    /// Fraction of the series used for training; the remainder is held out.
    pub train_split: f64,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            train_split: 0.7,
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

pub struct ForecastPipeline {
    market_data: Arc<dyn MarketDataSource>,
    cache: Arc<dyn ModelCache>,
    config: PipelineConfig,
    // One guard per (symbol, end_date); entries are retained for the
    // pipeline's lifetime.
    inflight: Mutex<HashMap<(String, NaiveDate), Arc<tokio::sync::Mutex<()>>>>,
}

impl ForecastPipeline {
    pub fn new(
        market_data: Arc<dyn MarketDataSource>,
        cache: Arc<dyn ModelCache>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            market_data,
            cache,
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn forecast(&self, request: &ForecastRequest) -> Result<ForecastOutcome> {
        validate_request(request)?;

        let guard = self.key_guard(&request.symbol, request.end_date);
        let _inflight = guard.lock().await;

        let cached = self
            .cache
            .get(&request.symbol, request.end_date)
            .await
            .context("model cache lookup failed")?;

        let series = self.fetch_series(request).await?;

        let (model, scaler, fit_quality, model_source) = match cached {
            Some(entry) => {
                if entry.lookback != self.config.lookback {
                    return Err(ForecastError::ShapeMismatch {
                        expected: self.config.lookback,
                        actual: entry.lookback,
                    }
                    .into());
                }
                let model = model::from_cached(&entry)?;
                // The persisted fit parameters are authoritative; the scale
                // is never re-derived from freshly fetched data on a hit.
                let scaler = MinMaxScaler::from_state(entry.scaler)?;
                info!(
                    "Loaded cached model for {} ({})",
                    request.symbol, request.end_date
                );
                (model, scaler, entry.fit_quality, ModelSource::Loaded)
            }
            None => {
                let (model, scaler, fit_quality) = self.train_and_store(request, &series).await?;
                (model, scaler, fit_quality, ModelSource::Trained)
            }
        };

        self.build_outcome(request, &series, model.as_ref(), &scaler, fit_quality, model_source)
    }

    async fn fetch_series(&self, request: &ForecastRequest) -> Result<PriceSeries> {
        let series = self
            .market_data
            .fetch_daily_closes(&request.symbol, request.start_date, request.end_date)
            .await
            .with_context(|| format!("market data fetch failed for {}", request.symbol))?;

        if series.is_empty() {
            return Err(ForecastError::DataUnavailable {
                symbol: request.symbol.clone(),
                reason: "provider returned an empty series".to_string(),
            }
            .into());
        }
        if series.len() < self.config.lookback {
            return Err(ForecastError::InsufficientData {
                required: self.config.lookback,
                actual: series.len(),
            }
            .into());
        }

        debug!(
            "Fetched {} closes for {} [{} .. {}]",
            series.len(),
            request.symbol,
            request.start_date,
            request.end_date
        );
        Ok(series)
    }

    async fn train_and_store(
        &self,
        request: &ForecastRequest,
        series: &PriceSeries,
    ) -> Result<(Box<dyn SequenceModel>, MinMaxScaler, f64)> {
        let lookback = self.config.lookback;
        let closes: Vec<f64> = series.iter().map(|p| p.close).collect();
        if closes.len() < lookback + 1 {
            return Err(ForecastError::InsufficientData {
                required: lookback + 1,
                actual: closes.len(),
            }
            .into());
        }

        // Chronological split; the boundary falls between windows because
        // windowing happens per segment.
        let split = (closes.len() as f64 * self.config.train_split) as usize;
        let (train_closes, test_closes) = closes.split_at(split);

        let scaler = MinMaxScaler::fit(train_closes)?;
        let train_scaled = scaler.transform_all(train_closes);
        let windows = make_windows(&train_scaled, lookback)?;

        info!(
            "Training model for {} ({}): {} windows, {} epochs",
            request.symbol,
            request.end_date,
            windows.len(),
            self.config.training.epochs
        );
        let mut model = model::new_model(lookback, &self.config.model, self.config.training.seed);
        model.train(&windows, &self.config.training)?;

        let fit_quality = self.evaluate(model.as_ref(), &scaler, train_closes, test_closes)?;
        info!(
            "Fit quality for {} ({}): {:.4}",
            request.symbol, request.end_date, fit_quality
        );

        let blob = model.to_blob();
        let entry = CachedModel {
            symbol: request.symbol.clone(),
            end_date: request.end_date,
            architecture: serde_json::to_string(&blob.architecture)
                .context("failed to serialize model architecture")?,
            weights: blob.weights,
            fit_quality,
            lookback,
            scaler: scaler.state(),
        };
        self.cache
            .put(&entry)
            .await
            .context("failed to persist trained model")?;

        Ok((model, scaler, fit_quality))
    }

    /// Hold-out evaluation: the test segment is scaled with the
    /// train-fitted scaler, prefixed with the last `lookback` train closes
    /// so the earliest test predictions have full context. Returns R²
    /// between de-scaled predictions and the raw test closes.
    fn evaluate(
        &self,
        model: &dyn SequenceModel,
        scaler: &MinMaxScaler,
        train_closes: &[f64],
        test_closes: &[f64],
    ) -> Result<f64> {
        let lookback = self.config.lookback;

        let mut context_closes: Vec<f64> = train_closes[train_closes.len() - lookback..].to_vec();
        context_closes.extend_from_slice(test_closes);
        let scaled = scaler.transform_all(&context_closes);

        let windows = make_windows(&scaled, lookback)?;
        let mut predicted = Vec::with_capacity(windows.len());
        for window in &windows {
            predicted.push(scaler.inverse_transform(model.predict(&window.input)?));
        }

        Ok(r2_score(test_closes, &predicted))
    }

    fn build_outcome(
        &self,
        request: &ForecastRequest,
        series: &PriceSeries,
        model: &dyn SequenceModel,
        scaler: &MinMaxScaler,
        fit_quality: f64,
        model_source: ModelSource,
    ) -> Result<ForecastOutcome> {
        let lookback = self.config.lookback;
        let seed: Vec<f64> = series[series.len() - lookback..]
            .iter()
            .map(|p| scaler.transform(p.close))
            .collect();

        let scaled_predictions = rollout(model, &seed, request.future_days)?;

        let last_known = series
            .last()
            .map(|p| p.date)
            .context("series unexpectedly empty")?;
        let dates = forecast_dates(last_known, request.future_days);

        let future_predictions: Vec<ForecastPoint> = dates
            .into_iter()
            .zip(scaled_predictions)
            .map(|(date, scaled)| ForecastPoint {
                date,
                price: round_price(scaler.inverse_transform(scaled)),
            })
            .collect();

        let first = future_predictions.first().copied();
        Ok(ForecastOutcome {
            model_source,
            next_trading_day: first.map(|p| p.date),
            predicted_price_today: first.map(|p| p.price),
            future_predictions,
            accuracy: fit_quality * 100.0,
        })
    }

    fn key_guard(&self, symbol: &str, end_date: NaiveDate) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inflight
            .entry((symbol.to_string(), end_date))
            .or_default()
            .clone()
    }
}

fn validate_request(request: &ForecastRequest) -> Result<(), ForecastError> {
    if request.symbol.trim().is_empty() {
        return Err(ForecastError::InvalidRequest {
            reason: "symbol must not be empty".to_string(),
        });
    }
    if request.start_date >= request.end_date {
        return Err(ForecastError::InvalidRequest {
            reason: format!(
                "start date {} must precede end date {}",
                request.start_date, request.end_date
            ),
        });
    }
    Ok(())
}

/// Autoregressive multi-step rollout: each prediction is appended to the
/// window and the oldest element dropped. Prediction error compounds into
/// later steps by construction; the output always has exactly `steps`
/// entries.
pub fn rollout(
    model: &dyn SequenceModel,
    seed: &[f64],
    steps: u32,
) -> Result<Vec<f64>, ForecastError> {
    let mut window = seed.to_vec();
    let mut predictions = Vec::with_capacity(steps as usize);

    for _ in 0..steps {
        let next = model.predict(&window)?;
        predictions.push(next);
        window.remove(0);
        window.push(next);
    }

    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::model::{Architecture, ModelBlob};
    use crate::application::windows::Window;

    /// Predicts last window element plus a constant step.
    #[derive(Debug)]
    struct StepModel {
        lookback: usize,
        delta: f64,
    }

    impl SequenceModel for StepModel {
        fn lookback(&self) -> usize {
            self.lookback
        }

        fn train(&mut self, _: &[Window], _: &TrainingConfig) -> Result<(), ForecastError> {
            Ok(())
        }

        fn predict(&self, window: &[f64]) -> Result<f64, ForecastError> {
            if window.len() != self.lookback {
                return Err(ForecastError::ShapeMismatch {
                    expected: self.lookback,
                    actual: window.len(),
                });
            }
            Ok(window[window.len() - 1] + self.delta)
        }

        fn to_blob(&self) -> ModelBlob {
            ModelBlob {
                architecture: Architecture::EchoState {
                    lookback: self.lookback,
                    reservoir_size: 0,
                    spectral_radius: 0.0,
                    input_scaling: 0.0,
                    sparsity: 0.0,
                    leak_rate: 0.0,
                },
                weights: vec![vec![], vec![], vec![0.0, 0.0]],
            }
        }
    }

    #[test]
    fn test_rollout_returns_exactly_requested_steps() {
        let model = StepModel {
            lookback: 3,
            delta: 0.1,
        };
        let seed = [0.0, 0.0, 0.0];

        assert_eq!(rollout(&model, &seed, 0).unwrap().len(), 0);
        assert_eq!(rollout(&model, &seed, 30).unwrap().len(), 30);
    }

    #[test]
    fn test_rollout_feeds_predictions_back() {
        let model = StepModel {
            lookback: 3,
            delta: 0.1,
        };
        let out = rollout(&model, &[0.0, 0.0, 0.0], 4).unwrap();

        for (i, v) in out.iter().enumerate() {
            let expected = 0.1 * (i + 1) as f64;
            assert!((v - expected).abs() < 1e-12, "step {i}: {v} != {expected}");
        }
    }

    #[test]
    fn test_rollout_is_deterministic() {
        let model = StepModel {
            lookback: 4,
            delta: 0.05,
        };
        let seed = [0.2, 0.4, 0.6, 0.8];

        let a = rollout(&model, &seed, 20).unwrap();
        let b = rollout(&model, &seed, 20).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rollout_propagates_shape_errors() {
        let model = StepModel {
            lookback: 5,
            delta: 0.1,
        };
        let err = rollout(&model, &[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_blank_symbol() {
        let request = ForecastRequest {
            symbol: "  ".to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            future_days: 30,
        };
        assert!(matches!(
            validate_request(&request),
            Err(ForecastError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_date_range() {
        let request = ForecastRequest {
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            future_days: 30,
        };
        assert!(matches!(
            validate_request(&request),
            Err(ForecastError::InvalidRequest { .. })
        ));
    }
}
