use crate::application::model::MODEL_SCHEMA_VERSION;
use crate::domain::errors::ForecastError;
use crate::domain::ports::ModelCache;
use crate::domain::types::{CachedModel, ScalerState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

/// SQLite-backed model store. Rows are keyed by (symbol, end_date) and a
/// `put` for an existing key replaces the whole row.
pub struct SqliteModelCache {
    pool: SqlitePool,
}

impl SqliteModelCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelCache for SqliteModelCache {
    async fn get(&self, symbol: &str, end_date: NaiveDate) -> Result<Option<CachedModel>> {
        let row = sqlx::query(
            "SELECT symbol, end_date, schema_version, architecture, weights, fit_quality, lookback, scaler_min, scaler_max \
             FROM models WHERE symbol = ? AND end_date = ?",
        )
        .bind(symbol)
        .bind(end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ForecastError::CacheIo {
            reason: e.to_string(),
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let schema_version: i64 = row.try_get("schema_version")?;
        if schema_version != MODEL_SCHEMA_VERSION {
            return Err(ForecastError::CacheIncompatible {
                reason: format!(
                    "row written under schema version {}, supported version is {}",
                    schema_version, MODEL_SCHEMA_VERSION
                ),
            }
            .into());
        }

        let weights_json: String = row.try_get("weights")?;
        let weights: Vec<Vec<f64>> = serde_json::from_str(&weights_json).map_err(|e| {
            ForecastError::CacheIncompatible {
                reason: format!("unreadable weights column: {e}"),
            }
        })?;

        let lookback: i64 = row.try_get("lookback")?;
        Ok(Some(CachedModel {
            symbol: row.try_get("symbol")?,
            end_date: row.try_get("end_date")?,
            architecture: row.try_get("architecture")?,
            weights,
            fit_quality: row.try_get("fit_quality")?,
            lookback: lookback as usize,
            scaler: ScalerState {
                min: row.try_get("scaler_min")?,
                max: row.try_get("scaler_max")?,
            },
        }))
    }

    async fn put(&self, model: &CachedModel) -> Result<()> {
        let weights_json =
            serde_json::to_string(&model.weights).context("Failed to serialize model weights")?;

        sqlx::query(
            r#"
            INSERT INTO models
            (symbol, end_date, schema_version, architecture, weights, fit_quality, lookback, scaler_min, scaler_max)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, end_date) DO UPDATE SET
                schema_version = excluded.schema_version,
                architecture = excluded.architecture,
                weights = excluded.weights,
                fit_quality = excluded.fit_quality,
                lookback = excluded.lookback,
                scaler_min = excluded.scaler_min,
                scaler_max = excluded.scaler_max
            "#,
        )
        .bind(&model.symbol)
        .bind(model.end_date)
        .bind(MODEL_SCHEMA_VERSION)
        .bind(&model.architecture)
        .bind(weights_json)
        .bind(model.fit_quality)
        .bind(model.lookback as i64)
        .bind(model.scaler.min)
        .bind(model.scaler.max)
        .execute(&self.pool)
        .await
        .map_err(|e| ForecastError::CacheIo {
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
