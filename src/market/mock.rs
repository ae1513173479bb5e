//! Mock market data source for tests and offline runs.
//!
//! This module provides a scripted source that answers from memory and can be
//! switched into failure modes without any network.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::client::MarketSource;
use super::types::{RawOrder, RawPairOrders, SourceInfo};
use crate::error::SourceError;

/// Configuration for mock source behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Number of upcoming `get_info` calls that fail.
    pub info_failures: u32,
    /// Number of upcoming `list_pairs` calls that fail.
    pub pairs_failures: u32,
    /// Whether `list_orders` fails.
    pub fail_orders: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

#[derive(Debug, Default)]
struct MockState {
    config: MockConfig,
    pairs: Vec<String>,
    orders: BTreeMap<String, RawPairOrders>,
    info_calls: u32,
    orders_calls: u32,
}

/// In-memory market data source.
#[derive(Debug, Clone, Default)]
pub struct MockMarketSource {
    state: Arc<Mutex<MockState>>,
}

impl MockMarketSource {
    /// Create a healthy mock with no pairs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with custom failure configuration.
    pub fn with_config(config: MockConfig) -> Self {
        let source = Self::new();
        source.lock().config = config;
        source
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the static pair list.
    pub fn set_pairs<I, S>(&self, pairs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().pairs = pairs.into_iter().map(Into::into).collect();
    }

    /// Replace one pair's raw orders.
    pub fn set_orders(&self, pair_id: impl Into<String>, orders: RawPairOrders) {
        self.lock().orders.insert(pair_id.into(), orders);
    }

    /// Toggle `list_orders` failures.
    pub fn set_fail_orders(&self, fail: bool) {
        self.lock().config.fail_orders = fail;
    }

    /// Make the next `count` `get_info` calls fail.
    pub fn fail_next_info(&self, count: u32) {
        self.lock().config.info_failures = count;
    }

    /// Number of `get_info` calls seen.
    pub fn info_calls(&self) -> u32 {
        self.lock().info_calls
    }

    /// Number of `list_orders` calls seen.
    pub fn orders_calls(&self) -> u32 {
        self.lock().orders_calls
    }

    async fn simulate_latency(&self) {
        let latency_ms = self.lock().config.latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency_ms)).await;
        }
    }
}

#[async_trait]
impl MarketSource for MockMarketSource {
    async fn get_info(&self) -> Result<SourceInfo, SourceError> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.info_calls += 1;
        if state.config.info_failures > 0 {
            state.config.info_failures -= 1;
            return Err(SourceError::Unavailable("Mock info failure".to_string()));
        }

        Ok(SourceInfo {
            version: "mock-1.0.0".to_string(),
            network: "simnet".to_string(),
            node_identity: "02mock".to_string(),
            alias: Some("mock".to_string()),
        })
    }

    async fn list_pairs(&self) -> Result<Vec<String>, SourceError> {
        self.simulate_latency().await;

        let mut state = self.lock();
        if state.config.pairs_failures > 0 {
            state.config.pairs_failures -= 1;
            return Err(SourceError::Unavailable("Mock pairs failure".to_string()));
        }
        Ok(state.pairs.clone())
    }

    async fn list_orders(&self) -> Result<BTreeMap<String, RawPairOrders>, SourceError> {
        self.simulate_latency().await;

        let mut state = self.lock();
        state.orders_calls += 1;
        if state.config.fail_orders {
            return Err(SourceError::Unavailable("Mock orders failure".to_string()));
        }
        Ok(state.orders.clone())
    }
}

/// Builder for raw pair orders.
#[derive(Debug, Default)]
pub struct RawOrdersBuilder {
    orders: RawPairOrders,
}

impl RawOrdersBuilder {
    /// Start an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sell order; `quantity` is in base units.
    pub fn sell(mut self, price: &str, quantity: u64) -> Self {
        self.orders.sell_orders.push(RawOrder::new(price, quantity));
        self
    }

    /// Add a buy order; `quantity` is in base units.
    pub fn buy(mut self, price: &str, quantity: u64) -> Self {
        self.orders.buy_orders.push(RawOrder::new(price, quantity));
        self
    }

    /// Finish the listing.
    pub fn build(self) -> RawPairOrders {
        self.orders
    }
}
