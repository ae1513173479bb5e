//! Raw market data shapes and their normalization into books.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::decimal::Decimal;
use crate::error::{DecimalError, SourceError};
use crate::orderbook::types::{Book, PriceLevel};

/// Raw order quantities are integer base units; this many make one unit.
pub const QUANTITY_SCALE: u64 = 100_000_000;

/// Service metadata as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceInfo {
    /// Source software version.
    pub version: String,
    /// Network the node runs on.
    pub network: String,
    /// Node public key.
    #[serde(alias = "nodePubKey")]
    pub node_identity: String,
    /// Optional human-readable alias.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Service metadata exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Source software version.
    pub version: String,
    /// Network the node runs on.
    pub network: String,
    /// Node public key.
    pub node_pub_key: String,
    /// Node alias, if any.
    pub node_alias: Option<String>,
}

impl From<SourceInfo> for NodeInfo {
    fn from(info: SourceInfo) -> Self {
        Self {
            version: info.version,
            network: info.network,
            node_pub_key: info.node_identity,
            node_alias: info.alias,
        }
    }
}

/// One raw order as listed by the source.
///
/// Both fields are kept as literals and only checked by [`RawOrder::to_level`],
/// so one bad value fails its own pair instead of the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOrder {
    /// Price literal.
    #[serde(deserialize_with = "literal")]
    pub price: String,
    /// Quantity literal in integer base units (see [`QUANTITY_SCALE`]).
    #[serde(deserialize_with = "literal")]
    pub quantity: String,
}

impl RawOrder {
    /// Create a raw order.
    pub fn new(price: impl Into<String>, quantity: u64) -> Self {
        Self {
            price: price.into(),
            quantity: quantity.to_string(),
        }
    }

    /// Convert into a price level, scaling the quantity to decimal units.
    ///
    /// Negative prices and negative or fractional quantities are parse errors.
    pub fn to_level(&self) -> Result<PriceLevel, DecimalError> {
        let price = Decimal::parse(&self.price)?;
        if price.is_negative() {
            return Err(DecimalError::Parse(self.price.clone()));
        }

        let quantity = Decimal::parse(&self.quantity)?;
        if quantity.is_negative() || quantity.round(0)? != quantity {
            return Err(DecimalError::Parse(self.quantity.clone()));
        }
        let amount = quantity.div_scale(QUANTITY_SCALE)?;
        Ok(PriceLevel::new(price, amount))
    }
}

/// Raw sell and buy orders for one pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPairOrders {
    /// Sell orders (asks).
    #[serde(default, alias = "sellOrdersList")]
    pub sell_orders: Vec<RawOrder>,
    /// Buy orders (bids).
    #[serde(default, alias = "buyOrdersList")]
    pub buy_orders: Vec<RawOrder>,
}

impl RawPairOrders {
    /// Normalize into an unmerged book at `version`.
    pub fn to_book(&self, version: u64) -> Result<Book, DecimalError> {
        let asks = self
            .sell_orders
            .iter()
            .map(RawOrder::to_level)
            .collect::<Result<Vec<_>, _>>()?;
        let bids = self
            .buy_orders
            .iter()
            .map(RawOrder::to_level)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Book::new(version, asks, bids))
    }
}

/// Normalize a `QUOTE/BASE` identifier to the `quote_base` key.
pub fn normalize_pair(pair_id: &str) -> Result<String, SourceError> {
    let malformed = |reason: &str| SourceError::Malformed {
        pair: pair_id.to_string(),
        reason: reason.to_string(),
    };

    let (quote, base) = pair_id
        .split_once('/')
        .ok_or_else(|| malformed("expected QUOTE/BASE"))?;
    if quote.is_empty() || base.is_empty() || base.contains('/') {
        return Err(malformed("expected QUOTE/BASE"));
    }

    Ok(format!("{}_{}", quote.to_lowercase(), base.to_lowercase()))
}

/// Broadcast channel name for a pair key.
pub fn channel_name(pair_key: &str) -> String {
    format!("orders/{pair_key}")
}

/// Accept any JSON scalar as a literal: strings as-is, everything else in its
/// JSON text form, which then fails decimal parsing unless it is a number.
fn literal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_pair_lowercases_and_rewrites() {
        assert_eq!(normalize_pair("LTC/BTC").unwrap(), "ltc_btc");
        assert_eq!(normalize_pair("eth/btc").unwrap(), "eth_btc");
    }

    #[test]
    fn normalize_pair_rejects_malformed_ids() {
        for id in ["LTCBTC", "/BTC", "LTC/", "A/B/C", ""] {
            assert!(
                matches!(normalize_pair(id), Err(SourceError::Malformed { .. })),
                "{id:?}"
            );
        }
    }

    #[test]
    fn raw_order_scales_quantity() {
        let level = RawOrder::new("0.0079", 150_000_000).to_level().unwrap();
        assert_eq!(level.price.to_string(), "0.0079");
        assert_eq!(level.amount.to_string(), "1.5");

        let dust = RawOrder::new("1", 1).to_level().unwrap();
        assert_eq!(dust.amount.to_string(), "0.00000001");
    }

    #[test]
    fn raw_order_rejects_bad_prices() {
        assert!(RawOrder::new("abc", 1).to_level().is_err());
        assert!(RawOrder::new("-1", 1).to_level().is_err());
    }

    #[test]
    fn raw_order_rejects_bad_quantities() {
        for quantity in ["-5", "1.5", "lots", "true", "null"] {
            let order = RawOrder {
                price: "0.1".to_string(),
                quantity: quantity.to_string(),
            };
            assert_eq!(
                order.to_level(),
                Err(DecimalError::Parse(quantity.to_string())),
                "{quantity}"
            );
        }
    }

    #[test]
    fn raw_orders_keep_malformed_values_for_later() {
        let json = r#"{"sell_orders":[
                         {"price":"0.1","quantity":"100000000"},
                         {"price":"0.2","quantity":-5},
                         {"price":"0.3","quantity":2.5},
                         {"price":"0.4","quantity":false}]}"#;
        let raw: RawPairOrders = serde_json::from_str(json).unwrap();
        let quantities: Vec<_> = raw.sell_orders.iter().map(|o| o.quantity.as_str()).collect();
        assert_eq!(quantities, vec!["100000000", "-5", "2.5", "false"]);

        assert_eq!(raw.sell_orders[0].to_level().unwrap().amount.to_string(), "1");
        assert!(raw.to_book(0).is_err());
    }

    #[test]
    fn raw_orders_accept_numeric_prices() {
        let json = r#"{"sell_orders":[{"price":0.0079,"quantity":100000000}],
                       "buyOrdersList":[{"price":"0.0078","quantity":5}]}"#;
        let raw: RawPairOrders = serde_json::from_str(json).unwrap();
        assert_eq!(raw.sell_orders[0].price, "0.0079");

        let book = raw.to_book(2).unwrap();
        assert_eq!(book.version, 2);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids[0].amount.to_string(), "0.00000005");
    }

    #[test]
    fn source_info_maps_to_node_info() {
        let info: SourceInfo = serde_json::from_str(
            r#"{"version":"1.0.0","network":"mainnet","nodePubKey":"02ab","alias":"relay"}"#,
        )
        .unwrap();
        let node = NodeInfo::from(info);
        assert_eq!(node.node_pub_key, "02ab");

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["nodeAlias"], "relay");
        assert_eq!(json["network"], "mainnet");
    }

    #[test]
    fn channel_name_is_prefixed() {
        assert_eq!(channel_name("eth_btc"), "orders/eth_btc");
    }
}
