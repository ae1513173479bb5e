//! Market data source interface and its HTTP gateway client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::types::{RawPairOrders, SourceInfo};
use crate::config::Config;
use crate::error::SourceError;

/// The three calls the relay needs from a market data source.
///
/// Implementations report transport failures as errors; they never retry.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch node metadata.
    async fn get_info(&self) -> Result<SourceInfo, SourceError>;

    /// Fetch the static list of raw `QUOTE/BASE` pair identifiers.
    async fn list_pairs(&self) -> Result<Vec<String>, SourceError>;

    /// Fetch the full raw order book for every pair.
    async fn list_orders(&self) -> Result<BTreeMap<String, RawPairOrders>, SourceError>;
}

/// Pair list response from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPairsResponse {
    /// Raw pair identifiers.
    #[serde(default, alias = "pairsList")]
    pub pairs: Vec<String>,
}

/// Order listing response from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ListOrdersResponse {
    /// Orders by raw pair identifier.
    #[serde(default, alias = "ordersMap")]
    pub orders: BTreeMap<String, RawPairOrders>,
}

/// JSON-over-HTTP market data gateway client.
#[derive(Debug, Clone)]
pub struct HttpMarketSource {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Gateway base URL without trailing slash.
    base_url: String,
}

impl HttpMarketSource {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from config.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        Self::new(
            &config.source_url,
            Duration::from_millis(config.http_timeout_ms),
        )
    }

    /// Gateway base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Requesting source");

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "HTTP {} from {}",
                response.status(),
                path
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketSource for HttpMarketSource {
    #[instrument(skip(self))]
    async fn get_info(&self) -> Result<SourceInfo, SourceError> {
        self.get_json("/v1/info").await
    }

    #[instrument(skip(self))]
    async fn list_pairs(&self) -> Result<Vec<String>, SourceError> {
        let response: ListPairsResponse = self.get_json("/v1/pairs").await?;
        Ok(response.pairs)
    }

    #[instrument(skip(self))]
    async fn list_orders(&self) -> Result<BTreeMap<String, RawPairOrders>, SourceError> {
        let response: ListOrdersResponse = self.get_json("/v1/orders").await?;
        Ok(response.orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_trims_base_url() {
        let client = HttpMarketSource::new("http://127.0.0.1:8886/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8886");
    }

    #[test]
    fn list_orders_response_parses_gateway_shape() {
        let json = r#"{"orders":{"LTC/BTC":{"sell_orders":[{"price":"0.008","quantity":100000000}]}}}"#;
        let response: ListOrdersResponse = serde_json::from_str(json).unwrap();
        let ltc = &response.orders["LTC/BTC"];
        assert_eq!(ltc.sell_orders.len(), 1);
        assert!(ltc.buy_orders.is_empty());
    }

    #[test]
    fn bad_quantity_fails_only_its_pair() {
        let json = r#"{"orders":{
            "ETH/BTC":{"buy_orders":[{"price":"0.05","quantity":"100000000"}]},
            "LTC/BTC":{"sell_orders":[{"price":"0.008","quantity":-5}]}
        }}"#;
        let response: ListOrdersResponse = serde_json::from_str(json).unwrap();

        let eth = response.orders["ETH/BTC"].to_book(0).unwrap();
        assert_eq!(eth.bids[0].amount.to_string(), "1");
        assert!(response.orders["LTC/BTC"].to_book(0).is_err());
    }

    #[test]
    fn list_pairs_response_accepts_alias() {
        let response: ListPairsResponse =
            serde_json::from_str(r#"{"pairsList":["LTC/BTC","ETH/BTC"]}"#).unwrap();
        assert_eq!(response.pairs, vec!["LTC/BTC", "ETH/BTC"]);
    }

    #[tokio::test]
    async fn unreachable_gateway_is_an_error() {
        // Nothing listens on the discard port.
        let client = HttpMarketSource::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(client.get_info().await.is_err());
    }
}
