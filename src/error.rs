//! Unified error types for the book relay.

use thiserror::Error;

/// Unified error type for the book relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Order book query error.
    #[error("book error: {0}")]
    Book(#[from] BookError),

    /// Market data source error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

/// Exact decimal parsing and arithmetic errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    /// The input is not a valid decimal literal.
    #[error("invalid decimal literal: {0:?}")]
    Parse(String),

    /// Division would not produce an exact result.
    #[error("{value} is not exactly divisible by {divisor}")]
    Inexact {
        /// Dividend.
        value: String,
        /// Divisor.
        divisor: u64,
    },

    /// The result does not fit the representable range.
    #[error("decimal overflow")]
    Overflow,
}

/// Caller-facing order book query errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    /// Bucket width is not exactly 1 x 10^k.
    #[error("invalid bucket width: {0}")]
    InvalidBucketWidth(String),

    /// The pair is not tracked.
    #[error("unknown pair: {0}")]
    UnknownPair(String),

    /// Initialization against the source has not completed yet.
    #[error("service info not available yet")]
    NotReady,

    /// Arithmetic failure while aggregating levels.
    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

/// Market data source errors.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not be reached or answered with a failure.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A pair's raw data could not be normalized.
    #[error("malformed data for {pair}: {reason}")]
    Malformed {
        /// Raw pair identifier.
        pair: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `PAIRS_WEIGHT` could not be parsed.
    #[error("failed to parse PAIRS_WEIGHT value {0:?}")]
    PairWeights(String),

    /// `SOURCE_URL` is not a valid URL.
    #[error("invalid SOURCE_URL {url:?}: {reason}")]
    SourceUrl {
        /// The configured value.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A numeric setting is out of range.
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, RelayError>;
