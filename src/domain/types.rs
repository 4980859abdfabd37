use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One trading day's closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Ordered close-price history, earliest first. Dates are strictly
/// increasing; exchange-calendar gaps are allowed.
pub type PriceSeries = Vec<PricePoint>;

/// Min-max fit parameters. Persisted alongside the trained model so that
/// inversion after a cache hit uses the exact scale the model was trained
/// with, not one re-derived from possibly revised data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub min: f64,
    pub max: f64,
}

/// Durable record for one trained model, keyed by (symbol, end_date).
///
/// `architecture` is an opaque serialized tag owned by the model layer;
/// `weights` is the fixed-order list of flat parameter arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedModel {
    pub symbol: String,
    pub end_date: NaiveDate,
    pub architecture: String,
    pub weights: Vec<Vec<f64>>,
    pub fit_quality: f64,
    pub lookback: usize,
    pub scaler: ScalerState,
}

/// A single forecasted trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Where the model used for a forecast came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Trained,
    Loaded,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Trained => write!(f, "trained"),
            ModelSource::Loaded => write!(f, "loaded"),
        }
    }
}

/// One forecast request: instrument, training window and horizon.
///
/// `future_days` is unsigned, so a negative horizon is unrepresentable;
/// zero is a valid request and yields an empty forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub future_days: u32,
}

/// Pipeline result. `next_trading_day` and `predicted_price_today` are the
/// first forecast point, absent when `future_days` was zero. `accuracy` is
/// the fit-quality score scaled to percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutcome {
    pub model_source: ModelSource,
    pub next_trading_day: Option<NaiveDate>,
    pub predicted_price_today: Option<f64>,
    pub future_predictions: Vec<ForecastPoint>,
    pub accuracy: f64,
}

/// Next weekday strictly after `date` (Sat/Sun skipped).
pub fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut next = date + chrono::Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += chrono::Duration::days(1);
    }
    next
}

/// The `count` weekday-stepped dates following `last_known`.
pub fn forecast_dates(last_known: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count as usize);
    let mut current = last_known;
    for _ in 0..count {
        current = next_weekday(current);
        dates.push(current);
    }
    dates
}

/// Round a price to cents for reporting.
pub fn round_price(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_weekday_skips_weekend() {
        // 2024-03-01 is a Friday
        assert_eq!(next_weekday(date(2024, 3, 1)), date(2024, 3, 4));
        // Saturday rolls to Monday as well
        assert_eq!(next_weekday(date(2024, 3, 2)), date(2024, 3, 4));
        // Midweek steps one day
        assert_eq!(next_weekday(date(2024, 3, 5)), date(2024, 3, 6));
    }

    #[test]
    fn test_forecast_dates_count_and_weekdays() {
        let dates = forecast_dates(date(2024, 3, 1), 10);
        assert_eq!(dates.len(), 10);
        for d in &dates {
            assert!(!matches!(d.weekday(), Weekday::Sat | Weekday::Sun));
        }
        assert_eq!(dates[0], date(2024, 3, 4));
        // Strictly increasing
        for pair in dates.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_forecast_dates_zero_count() {
        assert!(forecast_dates(date(2024, 3, 1), 0).is_empty());
    }

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(123.456), 123.46);
        assert_eq!(round_price(123.454), 123.45);
    }

    #[test]
    fn test_model_source_display() {
        assert_eq!(ModelSource::Trained.to_string(), "trained");
        assert_eq!(ModelSource::Loaded.to_string(), "loaded");
    }
}
