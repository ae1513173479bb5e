//! Book diffing and price-bucket aggregation.
//!
//! Both operations are pure: they take books by reference and build new ones.
//! Levels are keyed by price value, so `0.10` and `0.1` are one level.

use std::collections::BTreeMap;

use tracing::instrument;

use super::types::{Book, PriceLevel};
use crate::decimal::Decimal;
use crate::error::{BookError, DecimalError};

/// Exponent of the finest tick the relay tracks (`1e-8`).
pub const FINEST_EXPONENT: i64 = -8;

/// Default bucket width: one unit at [`FINEST_EXPONENT`].
pub fn finest_bucket_width() -> Decimal {
    // 1e-8 is always representable.
    Decimal::unit(FINEST_EXPONENT).unwrap_or(Decimal::ONE)
}

/// Validate a bucket width and return its exponent `k` for `1 x 10^k`.
pub fn bucket_exponent(width: &Decimal) -> Result<i64, BookError> {
    width
        .unit_power_of_ten()
        .ok_or_else(|| BookError::InvalidBucketWidth(width.to_string()))
}

/// Compute the changes that turn `previous` into `current`.
///
/// Returns `None` when nothing changed. Otherwise the result has version
/// `previous.version + 1` and, per side, every removed price with amount zero
/// plus every added or re-sized price with its new amount, ascending by price.
#[instrument(level = "trace", skip_all, fields(version = previous.version))]
pub fn diff(previous: &Book, current: &Book) -> Option<Book> {
    let asks = diff_levels(&previous.asks, &current.asks);
    let bids = diff_levels(&previous.bids, &current.bids);

    if asks.is_empty() && bids.is_empty() {
        return None;
    }

    Some(Book::new(previous.version + 1, asks, bids))
}

fn diff_levels(previous: &[PriceLevel], current: &[PriceLevel]) -> Vec<PriceLevel> {
    let before = by_price(previous);
    let after = by_price(current);

    let mut changes: BTreeMap<Decimal, Decimal> = before
        .keys()
        .filter(|price| !after.contains_key(*price))
        .map(|price| (*price, Decimal::ZERO))
        .collect();

    for (price, amount) in &after {
        if before.get(price) != Some(amount) {
            changes.insert(*price, *amount);
        }
    }

    changes
        .into_iter()
        .map(|(price, amount)| PriceLevel::new(price, amount))
        .collect()
}

fn by_price(levels: &[PriceLevel]) -> BTreeMap<Decimal, Decimal> {
    levels.iter().map(|l| (l.price, l.amount)).collect()
}

/// Aggregate a book into buckets of `width`, which must be exactly `1 x 10^k`.
///
/// Every price is rounded away from zero to a multiple of `10^k` on both
/// sides, amounts in a bucket are summed, asks come out ascending and bids
/// descending. The version is kept.
#[instrument(level = "trace", skip(book), fields(version = book.version, width = %width))]
pub fn merge(book: &Book, width: &Decimal) -> Result<Book, BookError> {
    let exponent = bucket_exponent(width)?;

    let asks = bucket_levels(&book.asks, exponent)?
        .into_iter()
        .map(|(price, amount)| PriceLevel::new(price, amount))
        .collect();
    let bids = bucket_levels(&book.bids, exponent)?
        .into_iter()
        .rev()
        .map(|(price, amount)| PriceLevel::new(price, amount))
        .collect();

    Ok(Book::new(book.version, asks, bids))
}

fn bucket_levels(
    levels: &[PriceLevel],
    exponent: i64,
) -> Result<BTreeMap<Decimal, Decimal>, DecimalError> {
    let mut buckets = BTreeMap::new();
    for level in levels {
        let price = level.price.round(exponent)?;
        let total = buckets.entry(price).or_insert(Decimal::ZERO);
        *total = total.checked_add(&level.amount)?;
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn levels(pairs: &[(&str, &str)]) -> Vec<PriceLevel> {
        pairs
            .iter()
            .map(|(price, amount)| PriceLevel::new(d(price), d(amount)))
            .collect()
    }

    fn render(levels: &[PriceLevel]) -> Vec<String> {
        levels
            .iter()
            .map(|l| format!("{} {}", l.price, l.amount))
            .collect()
    }

    #[test]
    fn diff_of_identical_books_is_none() {
        let book = Book::new(0, levels(&[("1", "1")]), levels(&[("0.5", "2")]));
        assert_eq!(diff(&book, &book), None);
        assert_eq!(diff(&book, &book.clone()), None);
    }

    #[test]
    fn diff_treats_equal_values_as_same_level() {
        let before = Book::new(0, levels(&[("0.10", "1.0")]), vec![]);
        let after = Book::new(0, levels(&[("0.1", "1")]), vec![]);
        assert_eq!(diff(&before, &after), None);
    }

    #[test]
    fn diff_marks_removed_levels_with_zero() {
        let before = Book::new(0, levels(&[("1", "1")]), vec![]);
        let after = Book::new(0, vec![], vec![]);

        let result = diff(&before, &after).unwrap();
        assert_eq!(result.version, 1);
        assert_eq!(render(&result.asks), vec!["1 0"]);
        assert!(result.bids.is_empty());
    }

    #[test]
    fn diff_reports_changed_amounts() {
        let before = Book::new(0, levels(&[("1", "1")]), vec![]);
        let after = Book::new(0, levels(&[("1", "1.1")]), vec![]);

        let result = diff(&before, &after).unwrap();
        assert_eq!(result.version, 1);
        assert_eq!(render(&result.asks), vec!["1 1.1"]);
    }

    #[test]
    fn diff_reports_added_levels_sorted() {
        let before = Book::new(0, levels(&[("1", "1")]), vec![]);
        let after = Book::new(0, levels(&[("2", "2"), ("1", "1.1")]), vec![]);

        let result = diff(&before, &after).unwrap();
        assert_eq!(render(&result.asks), vec!["1 1.1", "2 2"]);
        assert!(result.bids.is_empty());
    }

    #[test]
    fn diff_omits_unchanged_levels_and_sorts_bids_ascending() {
        let before = Book::new(
            7,
            levels(&[("3", "1"), ("4", "1")]),
            levels(&[("2", "5"), ("1", "5"), ("0.5", "1")]),
        );
        let after = Book::new(
            7,
            levels(&[("3", "1"), ("4", "1")]),
            levels(&[("2", "4"), ("1", "5"), ("0.4", "9")]),
        );

        let result = diff(&before, &after).unwrap();
        assert_eq!(result.version, 8);
        assert!(result.asks.is_empty());
        assert_eq!(render(&result.bids), vec!["0.4 9", "0.5 0", "2 4"]);
    }

    #[test]
    fn merge_sums_levels_in_same_bucket() {
        let book = Book::new(0, levels(&[("0.11", "1"), ("0.2", "1")]), vec![]);

        let tenth = merge(&book, &d("0.1")).unwrap();
        assert_eq!(tenth.version, 0);
        assert_eq!(render(&tenth.asks), vec!["0.2 2"]);
        assert!(tenth.bids.is_empty());

        let hundredth = merge(&book, &d("0.01")).unwrap();
        assert_eq!(render(&hundredth.asks), vec!["0.11 1", "0.2 1"]);

        let unit = merge(&book, &d("1")).unwrap();
        assert_eq!(render(&unit.asks), vec!["1 2"]);
    }

    #[test]
    fn merge_orders_asks_ascending_and_bids_descending() {
        let book = Book::new(
            4,
            levels(&[("0.21", "1"), ("0.11", "1"), ("0.2", "1")]),
            levels(&[("0.01", "1"), ("0.09", "1"), ("0.101", "1")]),
        );

        let merged = merge(&book, &d("0.1")).unwrap();
        assert_eq!(merged.version, 4);
        assert_eq!(render(&merged.asks), vec!["0.2 2", "0.3 1"]);
        assert_eq!(render(&merged.bids), vec!["0.2 1", "0.1 2"]);
    }

    #[test]
    fn merge_collapses_duplicate_ticks_at_finest_width() {
        let book = Book::new(0, levels(&[("0.5", "1"), ("0.50", "2.5")]), vec![]);
        let merged = merge(&book, &finest_bucket_width()).unwrap();
        assert_eq!(render(&merged.asks), vec!["0.5 3.5"]);
    }

    #[test]
    fn merge_accepts_coarse_widths() {
        let book = Book::new(0, vec![], levels(&[("123", "1"), ("99", "1")]));
        let merged = merge(&book, &d("1e2")).unwrap();
        assert_eq!(render(&merged.bids), vec!["200 1", "100 1"]);
    }

    #[test]
    fn merge_rejects_widths_that_are_not_unit_powers_of_ten() {
        let book = Book::empty();
        for width in ["2", "0.15", "0.2", "-0.1", "0"] {
            assert_eq!(
                merge(&book, &d(width)),
                Err(BookError::InvalidBucketWidth(d(width).to_string())),
                "{width}"
            );
        }
    }

    #[test]
    fn finest_width_is_one_satoshi() {
        assert_eq!(finest_bucket_width().to_string(), "0.00000001");
        assert_eq!(bucket_exponent(&finest_bucket_width()), Ok(FINEST_EXPONENT));
    }
}
