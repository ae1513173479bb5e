//! Order book types and data structures.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::decimal::Decimal;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    /// Sell side, presented ascending by price.
    Asks,
    /// Buy side, presented descending by price.
    Bids,
}

/// Single price level in an order book.
///
/// Serialized as `{"price": "0.01", "amount": "2.5"}` with canonical decimal
/// strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total amount available at this price.
    pub amount: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }
}

/// Versioned order book for one pair.
///
/// The same shape carries full snapshots and diffs. In a diff an amount of
/// zero means the level was removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    /// Monotonic version, bumped once per published diff.
    pub version: u64,
    /// Ask levels.
    pub asks: Vec<PriceLevel>,
    /// Bid levels.
    pub bids: Vec<PriceLevel>,
}

impl Book {
    /// Create a book from its parts.
    pub fn new(version: u64, asks: Vec<PriceLevel>, bids: Vec<PriceLevel>) -> Self {
        Self { version, asks, bids }
    }

    /// Empty book at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Levels of one side.
    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Asks => &self.asks,
            Side::Bids => &self.bids,
        }
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------- OrderBook ({}) ----------", self.version)?;
        for side in [Side::Asks, Side::Bids] {
            writeln!(f, "{}:", side.to_string().to_uppercase())?;
            for level in self.side(side) {
                writeln!(f, "- {}: {}", level.price, level.amount)?;
            }
        }
        write!(f, "-------------------------------------")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn level(price: &str, amount: &str) -> PriceLevel {
        PriceLevel::new(price.parse().unwrap(), amount.parse().unwrap())
    }

    #[test]
    fn price_level_creation() {
        let level = level("0.50", "100");
        assert_eq!(level.price.to_string(), "0.5");
        assert_eq!(level.amount.to_string(), "100");
    }

    #[test]
    fn book_serializes_with_decimal_strings() {
        let book = Book::new(3, vec![level("0.010", "1.50")], vec![level("0.009", "2")]);
        let json = serde_json::to_value(&book).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "version": 3,
                "asks": [{"price": "0.01", "amount": "1.5"}],
                "bids": [{"price": "0.009", "amount": "2"}],
            })
        );

        let back: Book = serde_json::from_value(json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn side_selects_levels() {
        let book = Book::new(0, vec![level("0.5", "1")], vec![level("0.4", "1"), level("0.3", "1")]);
        assert_eq!(book.side(Side::Asks).len(), 1);
        assert_eq!(book.side(Side::Bids)[1].price.to_string(), "0.3");
        assert!(!book.is_empty());
        assert!(Book::empty().is_empty());
    }

    #[test]
    fn display_lists_both_sides() {
        let book = Book::new(1, vec![level("2", "1")], vec![level("1", "3")]);
        let text = book.to_string();
        assert!(text.contains("OrderBook (1)"));
        assert!(text.contains("ASKS:\n- 2: 1"));
        assert!(text.contains("BIDS:\n- 1: 3"));
    }

    #[test]
    fn side_displays_lowercase() {
        assert_eq!(Side::Bids.to_string(), "bids");
    }
}
