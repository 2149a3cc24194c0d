//! Storage backend contract.
//!
//! A [`Backend`] is the uniform contract every embedded engine speaks:
//! conditional stores, range scans, numeric counters, and namespace-wide
//! flush. The dispatcher holds the live backend behind an `ArcSwap<Arc<dyn
//! Backend>>` (see [`crate::hotswap`]) and never matches on the concrete
//! engine type.
//!
//! Implementations: [`btree_bucket::BTreeBucketBackend`], [`lsm::LsmBackend`],
//! [`lsm_valuelog::LsmValueLogBackend`], [`inmemory::InMemoryBackend`].
//!
//! **IMPORTANT:** every method takes `&self`. Implementations must use
//! interior mutability (a reader/writer lock, or the storage engine's own
//! transaction machinery) so a single shared backend instance can serve many
//! connections concurrently.

pub mod btree_bucket;
pub mod inmemory;
pub mod lsm;
pub mod lsm_valuelog;

pub use btree_bucket::BTreeBucketBackend;
pub use inmemory::InMemoryBackend;
pub use lsm::LsmBackend;
pub use lsm_valuelog::LsmValueLogBackend;

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Iteration direction for [`Backend::range`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// `limit` argument to [`Backend::range`]: `Unlimited`, or a bound on the
/// number of entries returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Bounded(usize),
}

impl Limit {
    pub fn from_wire(n: i64) -> Self {
        if n < 0 {
            Limit::Unlimited
        } else {
            Limit::Bounded(n as usize)
        }
    }
}

/// Trait for the embedded key/value engines the server can run on top of.
///
/// All methods are synchronous and blocking from the caller's point of view;
/// the dispatcher runs them via `tokio::task::spawn_blocking` so a slow disk
/// operation on one connection cannot stall others. Implementations are
/// `Send + Sync` so a single instance can be shared (behind an `Arc`) across
/// every connection task.
pub trait Backend: Send + Sync {
    /// Store `value` for `key` unconditionally, creating or overwriting it.
    /// Returns whether the store created a new key (`true`) or overwrote an
    /// existing one (`false`), so the dispatcher can keep `current_items`
    /// accurate without a separate existence check.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Store `value` for `key` only if `key` does not already exist. Always
    /// creates on success.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if `key` is already present.
    fn add(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Store `value` for `key` only if `key` already exists. Never creates.
    ///
    /// # Errors
    /// [`Error::NotFound`] if `key` is absent.
    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Fetch the value stored for `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Delete `key`. Returns whether a value was actually removed.
    fn delete(&self, key: &[u8], only_if_exists: bool) -> Result<bool>;

    /// Add `delta` to the integer value of `key`, storing and returning the
    /// new value.
    ///
    /// # Errors
    /// [`Error::NotFound`] if `key` is absent, [`Error::NotNumeric`] if the
    /// current value does not parse as an `i64`.
    fn incr(&self, key: &[u8], delta: i64) -> Result<i64>;

    /// Equivalent to `incr(key, -delta)`. Does not clamp at zero: this
    /// preserves the source's observable behaviour of allowing negative
    /// counters, a deliberate deviation from canonical memcached.
    fn decr(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.incr(key, -delta)
    }

    /// Scan keys lexicographically matching `prefix`.
    ///
    /// If `from` is given, iteration starts at the first key `>= from`
    /// (forward) or `<= from` (reverse). Values are copied into the
    /// returned map so the caller can hold them past the backend's own
    /// iterator lifetime.
    fn range(
        &self,
        prefix: &[u8],
        limit: Limit,
        from: Option<&[u8]>,
        direction: Direction,
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>>;

    /// Empty the backend's namespace.
    fn flush(&self) -> Result<()>;

    /// Release any resources held by the backend. Called once, from the
    /// hot-swap coordinator, after the new backend is live.
    fn close(&self) -> Result<()>;

    /// Human-readable engine diagnostics (used by the `dbstats` command).
    fn stats(&self) -> String;

    /// Filesystem path this backend was opened from.
    fn db_path(&self) -> &str;
}

/// Parses an ASCII decimal signed integer the way the counter contract
/// requires, mapping a parse failure to [`Error::NotNumeric`].
pub(crate) fn parse_counter(raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(Error::NotNumeric)
}

#[cfg(test)]
pub(crate) mod contract_tests {
    //! Shared behavioural test suite run against every backend implementation.
    //! Each backend's own test module calls these against a fresh instance.
    use super::*;

    pub fn round_trip(backend: &dyn Backend) {
        backend.set(b"k", b"v1").unwrap();
        assert_eq!(backend.get(b"k").unwrap(), Some(b"v1".to_vec()));
        backend.set(b"k", b"v2").unwrap();
        assert_eq!(backend.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    pub fn add_replace_duality(backend: &dyn Backend) {
        let _ = backend.delete(b"ghost", false);
        assert!(matches!(
            backend.replace(b"ghost", b"x"),
            Err(Error::NotFound)
        ));
        assert!(backend.add(b"ghost", b"x").unwrap());
        assert!(matches!(
            backend.add(b"ghost", b"y"),
            Err(Error::AlreadyExists)
        ));
        assert!(!backend.replace(b"ghost", b"y").unwrap());
        assert_eq!(backend.get(b"ghost").unwrap(), Some(b"y".to_vec()));
    }

    pub fn set_reports_creation_vs_overwrite(backend: &dyn Backend) {
        let _ = backend.delete(b"fresh", false);
        assert!(backend.set(b"fresh", b"1").unwrap());
        assert!(!backend.set(b"fresh", b"2").unwrap());
    }

    pub fn counter_law(backend: &dyn Backend) {
        backend.set(b"counter", b"10").unwrap();
        assert_eq!(backend.incr(b"counter", 1).unwrap(), 11);
        assert_eq!(backend.decr(b"counter", 1).unwrap(), 10);
        assert_eq!(backend.get(b"counter").unwrap(), Some(b"10".to_vec()));
    }

    pub fn incr_on_missing_key_is_not_found(backend: &dyn Backend) {
        let _ = backend.delete(b"missing-counter", false);
        assert!(matches!(
            backend.incr(b"missing-counter", 1),
            Err(Error::NotFound)
        ));
    }

    pub fn incr_on_non_numeric_value_is_not_numeric(backend: &dyn Backend) {
        backend.set(b"word", b"not-a-number").unwrap();
        assert!(matches!(backend.incr(b"word", 1), Err(Error::NotNumeric)));
    }

    pub fn delete_reports_presence(backend: &dyn Backend) {
        backend.set(b"del-me", b"x").unwrap();
        assert!(backend.delete(b"del-me", true).unwrap());
        assert!(!backend.delete(b"del-me", true).unwrap());
    }

    pub fn flush_empties_namespace(backend: &dyn Backend) {
        backend.set(b"a", b"1").unwrap();
        backend.set(b"b", b"2").unwrap();
        backend.flush().unwrap();
        assert_eq!(backend.get(b"a").unwrap(), None);
        assert_eq!(backend.get(b"b").unwrap(), None);
    }
}
