//! Alpaca Market Data source
//!
//! Fetches daily close prices from the Alpaca data API
//! (`/v2/stocks/bars`, `timeframe=1Day`), following `next_page_token`
//! pagination until the requested range is exhausted.

use crate::domain::errors::ForecastError;
use crate::domain::ports::MarketDataSource;
use crate::domain::types::{PricePoint, PriceSeries};
use crate::infrastructure::http_client::{build_url_with_query, retrying_client};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct AlpacaBar {
    #[serde(rename = "t")]
    pub timestamp: String,
    #[serde(rename = "c")]
    pub close: f64,
}

#[derive(Debug, Deserialize)]
struct AlpacaBarsResponse {
    #[serde(default)]
    bars: HashMap<String, Vec<AlpacaBar>>,
    next_page_token: Option<String>,
}

pub struct AlpacaMarketData {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    data_base_url: String,
}

impl AlpacaMarketData {
    pub fn new(api_key: String, api_secret: String, data_base_url: String) -> Self {
        Self {
            client: retrying_client(),
            api_key,
            api_secret,
            data_base_url,
        }
    }

    fn bar_to_point(bar: &AlpacaBar) -> Result<PricePoint> {
        let date = DateTime::parse_from_rfc3339(&bar.timestamp)
            .with_context(|| format!("Invalid bar timestamp: {}", bar.timestamp))?
            .date_naive();
        Ok(PricePoint {
            date,
            close: bar.close,
        })
    }
}

#[async_trait]
impl MarketDataSource for AlpacaMarketData {
    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let url = format!("{}/v2/stocks/bars", self.data_base_url);

        let mut all_bars: Vec<AlpacaBar> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query_params = vec![
                ("symbols", symbol.to_string()),
                ("timeframe", "1Day".to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("limit", "10000".to_string()),
                ("feed", "iex".to_string()),
            ];
            if let Some(token) = &page_token {
                query_params.push(("page_token", token.clone()));
            }

            let full_url = build_url_with_query(&url, &query_params);
            debug!(
                "AlpacaMarketData: fetching daily bars for {} [{} .. {}]",
                symbol, start, end
            );

            let response = self
                .client
                .get(&full_url)
                .header("APCA-API-KEY-ID", &self.api_key)
                .header("APCA-API-SECRET-KEY", &self.api_secret)
                .send()
                .await
                .context("Failed to request daily bars")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ForecastError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("provider responded {status}: {body}"),
                }
                .into());
            }

            let resp_body: AlpacaBarsResponse = response
                .json()
                .await
                .context("Failed to parse bars response")?;

            if let Some(bars) = resp_body.bars.get(symbol) {
                all_bars.extend(bars.clone());
            }

            page_token = resp_body.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        if all_bars.is_empty() {
            return Err(ForecastError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no daily bars in the requested range".to_string(),
            }
            .into());
        }

        let mut series: PriceSeries = Vec::with_capacity(all_bars.len());
        for bar in &all_bars {
            series.push(Self::bar_to_point(bar)?);
        }
        series.sort_by_key(|p| p.date);
        series.dedup_by_key(|p| p.date);

        debug!(
            "AlpacaMarketData: {} daily closes for {}",
            series.len(),
            symbol
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_response_deserializes() {
        let body = r#"{
            "bars": {
                "AAPL": [
                    {"t": "2024-01-02T05:00:00Z", "o": 187.15, "h": 188.44, "l": 183.89, "c": 185.64, "v": 82488700},
                    {"t": "2024-01-03T05:00:00Z", "o": 184.22, "h": 185.88, "l": 183.43, "c": 184.25, "v": 58414500}
                ]
            },
            "next_page_token": null
        }"#;

        let parsed: AlpacaBarsResponse = serde_json::from_str(body).unwrap();
        let bars = &parsed.bars["AAPL"];
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 185.64);
        assert!(parsed.next_page_token.is_none());
    }

    #[test]
    fn test_empty_bars_response_deserializes() {
        let parsed: AlpacaBarsResponse = serde_json::from_str(r#"{"bars": {}}"#).unwrap();
        assert!(parsed.bars.is_empty());
    }

    #[test]
    fn test_bar_to_point_extracts_trading_date() {
        let bar = AlpacaBar {
            timestamp: "2024-01-02T05:00:00-00:00".to_string(),
            close: 185.64,
        };
        let point = AlpacaMarketData::bar_to_point(&bar).unwrap();
        assert_eq!(point.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(point.close, 185.64);
    }

    #[test]
    fn test_bar_to_point_rejects_garbage_timestamp() {
        let bar = AlpacaBar {
            timestamp: "yesterday".to_string(),
            close: 1.0,
        };
        assert!(AlpacaMarketData::bar_to_point(&bar).is_err());
    }
}
