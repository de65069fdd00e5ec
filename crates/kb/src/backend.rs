//! The backend-neutral KB contract (spec §4.1): `get`, `set`,
//! `transaction`, `scan`, plus the ambient `health`/`rebuild` operations
//! used by startup backend selection and the `rebuild-kb` CLI operation.

use crate::error::KbError;
use crate::key::KbKey;
use serde_json::Value;

/// A read-modify-write view over one transaction's key group.
///
/// Handed to the closure passed to [`KbBackend::transaction`]; reads and
/// writes through this view are what gets committed atomically (or
/// rejected with [`KbError::Conflict`]) when the closure returns.
pub struct TransactionView<'a> {
    reads: Vec<(&'a KbKey, Option<Value>)>,
    writes: Vec<(KbKey, Value)>,
}

impl<'a> TransactionView<'a> {
    /// Construct a view pre-populated with the group's current values,
    /// as read by the backend at transaction start.
    pub fn new(reads: Vec<(&'a KbKey, Option<Value>)>) -> Self {
        Self { reads, writes: Vec::new() }
    }

    /// Read a key's value as it stood when the transaction began.
    pub fn get(&self, key: &KbKey) -> Option<&Value> {
        self.reads.iter().find(|(k, _)| *k == key).and_then(|(_, v)| v.as_ref())
    }

    /// Stage a write, applied only if the transaction commits cleanly.
    pub fn set(&mut self, key: KbKey, value: Value) {
        self.writes.retain(|(k, _)| k != &key);
        self.writes.push((key, value));
    }

    /// Consume the view, returning the staged writes for the backend to
    /// apply.
    pub fn into_writes(self) -> Vec<(KbKey, Value)> {
        self.writes
    }
}

/// A restartable, finite iterator over `scan(prefix)` results (spec §4.1).
///
/// Pages results in bounded batches so a scan never holds a backend lock
/// for its entire lifetime; `next_batch` re-acquires the lock briefly
/// per page.
pub struct KbScanIter<'b> {
    backend: &'b dyn KbBackend,
    prefix: String,
    cursor: Option<KbKey>,
    batch_size: usize,
    exhausted: bool,
    buffer: std::collections::VecDeque<(KbKey, Value)>,
}

impl<'b> KbScanIter<'b> {
    /// Construct a scan over `prefix`, paging `batch_size` entries at a
    /// time (default chosen by the backend that creates this iterator).
    pub fn new(backend: &'b dyn KbBackend, prefix: impl Into<String>, batch_size: usize) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            cursor: None,
            batch_size: batch_size.max(1),
            exhausted: false,
            buffer: std::collections::VecDeque::new(),
        }
    }
}

impl Iterator for KbScanIter<'_> {
    type Item = Result<(KbKey, Value), KbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.backend.scan_page(&self.prefix, self.cursor.as_ref(), self.batch_size) {
                Ok(page) => {
                    if page.len() < self.batch_size {
                        self.exhausted = true;
                    }
                    self.cursor = page.last().map(|(k, _)| k.clone());
                    self.buffer.extend(page);
                }
                Err(err) => return Some(Err(err)),
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// The backend-neutral contract every KB implementation satisfies
/// (spec §4.1). Both `FastBackend` and `EmbeddedBackend` implement this
/// trait identically; callers never branch on which backend is active.
pub trait KbBackend: Send + Sync {
    /// Fetch a single key's value.
    fn get(&self, key: &KbKey) -> Result<Value, KbError>;

    /// Atomically write a single key.
    fn set(&self, key: &KbKey, value: Value) -> Result<(), KbError>;

    /// Read-modify-write over a key group with at-most-one-writer
    /// semantics: fails with [`KbError::Conflict`] if any key in `keys`
    /// changed since the transaction's read phase.
    fn transaction(
        &self,
        keys: &[KbKey],
        f: &mut dyn FnMut(&mut TransactionView<'_>) -> Result<(), KbError>,
    ) -> Result<(), KbError>;

    /// One page of a prefix scan, used internally by [`KbScanIter`].
    /// `after` is the last key returned by the previous page, or `None`
    /// for the first page.
    fn scan_page(
        &self,
        prefix: &str,
        after: Option<&KbKey>,
        limit: usize,
    ) -> Result<Vec<(KbKey, Value)>, KbError>;

    /// A lazy, restartable iterator over every key under `prefix`.
    fn scan<'b>(&'b self, prefix: &str) -> KbScanIter<'b>
    where
        Self: Sized,
    {
        KbScanIter::new(self, prefix, 128)
    }

    /// Cheap reachability check, used at startup to choose between
    /// `FastBackend` and `EmbeddedBackend` (spec §4.1's `auto` policy).
    fn health(&self) -> Result<(), KbError>;

    /// Discard all state and reconstruct the schema marker. The actual
    /// repopulation from the filesystem is driven by
    /// `sheaf_bubble::health::rebuild_kb`, which calls `set`/`transaction`
    /// against this freshly-cleared backend.
    fn rebuild(&self) -> Result<(), KbError>;
}
