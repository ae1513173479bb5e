//! Market module for the upstream data source.
//!
//! This module handles:
//! - Raw order listing types and normalization into books
//! - The `MarketSource` interface and its HTTP gateway client
//! - Mock source for testing

pub mod client;
pub mod mock;
pub mod types;

pub use client::{HttpMarketSource, MarketSource};
pub use mock::{MockConfig, MockMarketSource, RawOrdersBuilder};
pub use types::{
    channel_name, normalize_pair, NodeInfo, RawOrder, RawPairOrders, SourceInfo, QUANTITY_SCALE,
};
