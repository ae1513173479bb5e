//! Per-pair book storage shared between the sync loop and queries.
//!
//! Books are held as `Arc<Book>` and replaced whole, so a reader sees either
//! the old or the new version of a pair, never a mix. Only the sync loop
//! writes.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::decimal::Decimal;
use crate::error::BookError;
use crate::market::types::NodeInfo;
use crate::orderbook::aggregator::merge;
use crate::orderbook::types::Book;

/// Pair key to book map plus node metadata.
#[derive(Debug, Default)]
pub struct PairStore {
    /// Latest book per normalized pair key.
    books: DashMap<String, Arc<Book>>,
    /// Pair keys in discovery order.
    order: RwLock<Vec<String>>,
    /// Listing weights, higher first.
    weights: HashMap<String, i64>,
    /// Source metadata, set once initialization succeeds.
    info: OnceCell<NodeInfo>,
}

impl PairStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that lists pairs by the given weights.
    pub fn with_weights(weights: HashMap<String, i64>) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    /// Track `key` with an empty version 0 book unless already known.
    ///
    /// Returns whether the pair was created.
    pub fn ensure_pair(&self, key: &str) -> bool {
        let mut order = self.order.write().unwrap_or_else(PoisonError::into_inner);
        match self.books.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Book::empty()));
                order.push(key.to_string());
                info!(pair = %key, "Tracking new pair");
                true
            }
        }
    }

    /// Current book for a pair.
    pub fn book(&self, key: &str) -> Option<Arc<Book>> {
        self.books.get(key).map(|book| Arc::clone(book.value()))
    }

    /// Atomically replace a pair's book, creating the pair if needed.
    pub fn replace(&self, key: &str, book: Book) {
        self.ensure_pair(key);
        self.books.insert(key.to_string(), Arc::new(book));
    }

    /// The stored book merged at `width`.
    pub fn snapshot(&self, key: &str, width: &Decimal) -> Result<Book, BookError> {
        let book = self
            .book(key)
            .ok_or_else(|| BookError::UnknownPair(key.to_string()))?;
        merge(&book, width)
    }

    /// Tracked pair keys, weighted pairs first, then discovery order.
    pub fn pairs(&self) -> Vec<String> {
        let mut pairs = self
            .order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        pairs.sort_by_key(|pair| Reverse(self.weights.get(pair).copied()));
        pairs
    }

    /// Number of tracked pairs.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no pair is tracked.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Record source metadata. Only the first call has an effect.
    pub fn set_info(&self, info: NodeInfo) -> bool {
        self.info.set(info).is_ok()
    }

    /// Source metadata, available once initialization completed.
    pub fn info(&self) -> Result<NodeInfo, BookError> {
        self.info.get().cloned().ok_or(BookError::NotReady)
    }

    /// Whether initialization completed.
    pub fn is_ready(&self) -> bool {
        self.info.get().is_some()
    }
}
