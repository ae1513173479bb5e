//! Polling loop that mirrors the source into the [`PairStore`].
//!
//! ```text
//! Initializing ──ok──▶ Polling ◀──ok── BackingOff
//!      ▲ │                │               ▲
//!      └─┘ retry          └────fetch err──┘
//! ```
//!
//! Each cycle fetches every pair's full listing, normalizes and merges it at
//! the finest tick, diffs it against the stored book, stores the new book and
//! broadcasts the diff. Cycles never overlap and the loop sleeps the same fixed
//! delay after every cycle and before every retry.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{RelayError, SourceError};
use crate::market::client::MarketSource;
use crate::market::types::{channel_name, normalize_pair, RawPairOrders};
use crate::metrics;
use crate::orderbook::aggregator::{diff, finest_bucket_width, merge};
use crate::orderbook::types::Book;
use crate::store::PairStore;

/// One published diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEvent {
    /// Channel name, `orders/<pair>`.
    pub channel: String,
    /// Normalized pair key.
    #[serde(skip)]
    pub pair: String,
    /// Changed levels with the new version.
    #[serde(rename = "data")]
    pub diff: Book,
}

impl DiffEvent {
    /// Wrap a diff for `pair`.
    pub fn new(pair: impl Into<String>, diff: Book) -> Self {
        let pair = pair.into();
        Self {
            channel: channel_name(&pair),
            pair,
            diff,
        }
    }

    /// Wire form: `{"channel":"orders/<pair>","data":{"version":..,"asks":[..],"bids":[..]}}`.
    pub fn to_message(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SyncState {
    /// Waiting for the source to answer info and pair list calls.
    Initializing,
    /// Last cycle fetched successfully.
    Polling,
    /// Last fetch failed; retrying after the fixed delay.
    BackingOff,
}

/// Outcome counts of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Pairs present in the response.
    pub pairs: usize,
    /// Pairs whose diff was published.
    pub changed: usize,
    /// Pairs skipped because their data was malformed.
    pub failed: usize,
}

/// Stops a running [`SyncLoop`] at its next suspension point.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Create a handle and the receiver the loop listens on.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }
}

/// Resolves once shutdown was requested. Never resolves if the handle is gone.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run `fut` unless shutdown is requested first.
async fn cancellable<F: Future>(shutdown: watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => None,
        output = fut => Some(output),
    }
}

/// Mirrors a [`MarketSource`] into a [`PairStore`] and broadcasts diffs.
pub struct SyncLoop<S> {
    source: S,
    store: Arc<PairStore>,
    diffs: broadcast::Sender<DiffEvent>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    state: SyncState,
}

impl<S: MarketSource> SyncLoop<S> {
    /// Create a loop. `interval` is both the cadence and the retry delay.
    pub fn new(
        source: S,
        store: Arc<PairStore>,
        diffs: broadcast::Sender<DiffEvent>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            store,
            diffs,
            interval,
            shutdown,
            state: SyncState::Initializing,
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Initialize, then poll until shutdown.
    pub async fn run(mut self) {
        info!(interval = ?self.interval, "Starting sync loop");

        if self.initialize().await {
            loop {
                match cancellable(self.shutdown.clone(), self.poll_once()).await {
                    None => break,
                    Some(Ok(summary)) => {
                        self.state = SyncState::Polling;
                        debug!(
                            pairs = summary.pairs,
                            changed = summary.changed,
                            failed = summary.failed,
                            "Poll cycle complete"
                        );
                    }
                    Some(Err(e)) => {
                        self.state = SyncState::BackingOff;
                        warn!(error = %e, "Order fetch failed, keeping last snapshots");
                    }
                }

                if !self.pause().await {
                    break;
                }
            }
        }

        info!("Sync loop stopped");
    }

    /// Spawn [`run`](Self::run) on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(self.run())
    }

    /// Retry info and pair list fetches until both succeed.
    ///
    /// Returns `false` if shutdown was requested first.
    pub async fn initialize(&mut self) -> bool {
        self.state = SyncState::Initializing;
        loop {
            match cancellable(self.shutdown.clone(), self.try_initialize()).await {
                None => return false,
                Some(Ok(created)) => {
                    info!(pairs = created, "Source ready");
                    self.state = SyncState::Polling;
                    return true;
                }
                Some(Err(e)) => {
                    metrics::inc_poll_failures();
                    warn!(error = %e, retry_in = ?self.interval, "Source not ready");
                }
            }

            if !self.pause().await {
                return false;
            }
        }
    }

    async fn try_initialize(&self) -> Result<usize, SourceError> {
        let info = self.source.get_info().await?;
        let pairs = self.source.list_pairs().await?;

        let mut created = 0;
        for pair_id in &pairs {
            match normalize_pair(pair_id) {
                Ok(key) => {
                    if self.store.ensure_pair(&key) {
                        created += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring pair"),
            }
        }

        info!(version = %info.version, network = %info.network, "Connected to source");
        self.store.set_info(info.into());
        Ok(created)
    }

    /// Run one fetch-normalize-merge-diff-publish cycle over all pairs.
    ///
    /// A fetch failure leaves every stored book untouched. A malformed pair
    /// only fails its own update. When two raw ids share a key, the first one
    /// in listing order wins and the rest are skipped.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<PollSummary, SourceError> {
        let fetched = {
            let _timer = metrics::timer_fetch();
            self.source.list_orders().await
        };
        metrics::inc_polls();
        let orders = fetched.inspect_err(|_| metrics::inc_poll_failures())?;

        let mut summary = PollSummary {
            pairs: orders.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        for (pair_id, raw) in &orders {
            let outcome = match normalize_pair(pair_id) {
                Ok(key) if !seen.insert(key.clone()) => {
                    summary.failed += 1;
                    metrics::inc_pair_update_failures();
                    warn!(pair = %pair_id, key = %key, "Skipping duplicate pair in listing");
                    continue;
                }
                _ => self.apply(pair_id, raw),
            };

            match outcome {
                Ok(Some(event)) => {
                    summary.changed += 1;
                    self.publish(event);
                }
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    metrics::inc_pair_update_failures();
                    warn!(pair = %pair_id, error = %e, "Skipping pair update");
                }
            }
        }

        Ok(summary)
    }

    /// Fold one pair's raw listing into the store, returning the diff if any.
    pub fn apply(&self, pair_id: &str, raw: &RawPairOrders) -> Result<Option<DiffEvent>, RelayError> {
        let key = normalize_pair(pair_id)?;
        self.store.ensure_pair(&key);
        let stored = self.store.book(&key).unwrap_or_default();

        let candidate = raw
            .to_book(stored.version)
            .map_err(|e| SourceError::Malformed {
                pair: pair_id.to_string(),
                reason: e.to_string(),
            })?;
        let candidate = merge(&candidate, &finest_bucket_width())?;

        let Some(changes) = diff(&stored, &candidate) else {
            return Ok(None);
        };

        self.store.replace(
            &key,
            Book::new(changes.version, candidate.asks, candidate.bids),
        );
        Ok(Some(DiffEvent::new(key, changes)))
    }

    fn publish(&self, event: DiffEvent) {
        debug!(
            channel = %event.channel,
            version = event.diff.version,
            asks = event.diff.asks.len(),
            bids = event.diff.bids.len(),
            "Publishing diff"
        );
        metrics::inc_diffs_published();
        // No subscribers is fine.
        let _ = self.diffs.send(event);
    }

    /// Sleep the fixed delay. Returns `false` if shutdown was requested.
    async fn pause(&self) -> bool {
        cancellable(self.shutdown.clone(), tokio::time::sleep(self.interval))
            .await
            .is_some()
    }
}
