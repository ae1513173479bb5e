//! Order-book mirror relay.
//!
//! Polls an upstream market gateway for every trading pair's full order
//! listing, keeps a normalized copy of each book, and pushes only what changed
//! to WebSocket subscribers. Clients ask for snapshots merged into price
//! buckets of any power-of-ten width.
//!
//! ```text
//! source ──list_orders──▶ SyncLoop ──merge/diff──▶ PairStore ──▶ GET /api/orders/:pair
//!                             │
//!                             └──DiffEvent──▶ broadcast ──▶ /ws
//! ```
//!
//! All prices and amounts are exact [`decimal::Decimal`] values; two spellings
//! of the same number are the same price level.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`decimal`]: Exact decimal values with ceiling rounding
//! - [`market`]: Source interface, HTTP client, raw order types, and a mock
//! - [`orderbook`]: Book types, diff, and bucket merge
//! - [`store`]: Per-pair book storage
//! - [`sync`]: Polling loop and diff broadcast
//! - [`api`]: HTTP API and WebSocket stream
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod decimal;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod store;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use decimal::Decimal;
pub use error::{RelayError, Result};
