//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Market Data Source ===
    /// Base URL of the market data gateway.
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Per-request timeout for source calls.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Sync Loop ===
    /// Delay between poll cycles, also used before every retry.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Buffered diff events per subscriber before it starts lagging.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Pair ordering weights, e.g. `eth_btc:2,ltc_btc:1`.
    #[serde(default)]
    pub pairs_weight: Option<String>,

    // === Server Configuration ===
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served for unmatched paths.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Expose Prometheus metrics.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_source_url() -> String {
    "http://127.0.0.1:8886".to_string()
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            http_timeout_ms: default_http_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            broadcast_capacity: default_broadcast_capacity(),
            pairs_weight: None,
            port: default_port(),
            static_dir: default_static_dir(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.source_url).map_err(|e| ConfigError::SourceUrl {
            url: self.source_url.clone(),
            reason: e.to_string(),
        })?;

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::NotPositive("POLL_INTERVAL_MS"));
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("HTTP_TIMEOUT_MS"));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::NotPositive("BROADCAST_CAPACITY"));
        }

        self.pair_weights()?;
        Ok(())
    }

    /// Fixed delay of the sync loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parsed `PAIRS_WEIGHT`. Empty when unset.
    pub fn pair_weights(&self) -> Result<HashMap<String, i64>, ConfigError> {
        let value = self.pairs_weight.as_deref().unwrap_or("").trim();
        if value.is_empty() {
            return Ok(HashMap::new());
        }

        let invalid = || ConfigError::PairWeights(value.to_string());
        value
            .split(',')
            .map(|part| {
                let (pair, weight) = part.trim().split_once(':').ok_or_else(invalid)?;
                let pair = pair.trim();
                if pair.is_empty() {
                    return Err(invalid());
                }
                let weight = weight.trim().parse().map_err(|_| invalid())?;
                Ok((pair.to_lowercase(), weight))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.port, 8080);
        assert_eq!(config.static_dir, "public");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pair_weights_parse() {
        let config = Config {
            pairs_weight: Some(" eth_btc:2, LTC_BTC:1 ".to_string()),
            ..Config::default()
        };

        let weights = config.pair_weights().unwrap();
        assert_eq!(weights.get("eth_btc"), Some(&2));
        assert_eq!(weights.get("ltc_btc"), Some(&1));
    }

    #[test]
    fn validate_rejects_malformed_pair_weights() {
        for value in ["eth_btc", "eth_btc:x", ":3", "eth_btc:1,"] {
            let config = Config {
                pairs_weight: Some(value.to_string()),
                ..Config::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::PairWeights(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("POLL_INTERVAL_MS"))
        );
    }

    #[test]
    fn load_reports_malformed_env_values() {
        std::env::set_var("METRICS_PORT", "not-a-port");
        let result = Config::load();
        std::env::remove_var("METRICS_PORT");
        assert!(matches!(result, Err(crate::RelayError::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_source_url() {
        let config = Config {
            source_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SourceUrl { .. })));
    }
}
