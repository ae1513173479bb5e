//! Order book module.
//!
//! This module handles:
//! - Book and price level types
//! - Diffing two books into a versioned change set
//! - Merging price levels into power-of-ten buckets

pub mod aggregator;
pub mod types;

pub use aggregator::{bucket_exponent, diff, finest_bucket_width, merge, FINEST_EXPONENT};
pub use types::{Book, PriceLevel, Side};
