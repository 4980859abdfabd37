use crate::domain::types::{CachedModel, PriceSeries};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

// Need async_trait for async functions in traits
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Daily closes for `symbol` over [start, end], earliest first.
    /// Fails with `DataUnavailable` when the provider returns nothing.
    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries>;
}

/// Durable store for trained models, keyed by (symbol, end_date).
/// `put` has upsert semantics: a later save fully replaces an earlier one
/// for the same key. Concurrent upserts are last-write-wins.
#[async_trait]
pub trait ModelCache: Send + Sync {
    async fn get(&self, symbol: &str, end_date: NaiveDate) -> Result<Option<CachedModel>>;

    async fn put(&self, model: &CachedModel) -> Result<()>;
}
