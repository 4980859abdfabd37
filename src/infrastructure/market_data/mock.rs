use crate::domain::ports::MarketDataSource;
use crate::domain::types::{PricePoint, PriceSeries, next_weekday};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic market data for tests and `Mode::Mock`: serves a fixed
/// series, filtered to the requested range. Counts fetches so tests can
/// assert how often the pipeline went to the provider.
pub struct MockMarketData {
    points: Vec<PricePoint>,
    fetch_calls: AtomicUsize,
}

impl MockMarketData {
    pub fn with_points(points: Vec<PricePoint>) -> Self {
        Self {
            points,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Weekday-stepped linear ramp: `days` closes starting at `base` on
    /// `first_date`, increasing by `step` per trading day.
    pub fn linear_ramp(first_date: NaiveDate, days: usize, base: f64, step: f64) -> Self {
        let mut points = Vec::with_capacity(days);
        let mut date = first_date;
        for i in 0..days {
            points.push(PricePoint {
                date,
                close: base + step * i as f64,
            });
            date = next_weekday(date);
        }
        Self::with_points(points)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketDataSource for MockMarketData {
    async fn fetch_daily_closes(
        &self,
        _symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .points
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_linear_ramp_is_weekday_stepped() {
        let mock = MockMarketData::linear_ramp(date(2024, 1, 1), 20, 100.0, 1.0);
        let series = mock
            .fetch_daily_closes("TEST", date(2024, 1, 1), date(2024, 12, 31))
            .await
            .unwrap();

        assert_eq!(series.len(), 20);
        assert_eq!(series[0].close, 100.0);
        assert_eq!(series[19].close, 119.0);
        for p in &series {
            assert!(!matches!(
                p.date.weekday(),
                chrono::Weekday::Sat | chrono::Weekday::Sun
            ));
        }
    }

    #[tokio::test]
    async fn test_range_filtering() {
        let mock = MockMarketData::linear_ramp(date(2024, 1, 1), 10, 100.0, 1.0);
        let series = mock
            .fetch_daily_closes("TEST", date(2024, 1, 3), date(2024, 1, 5))
            .await
            .unwrap();

        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|p| p.date >= date(2024, 1, 3)));

        let empty = mock
            .fetch_daily_closes("TEST", date(2030, 1, 1), date(2030, 2, 1))
            .await
            .unwrap();
        assert!(empty.is_empty());

        assert_eq!(mock.fetch_calls(), 2);
    }
}
