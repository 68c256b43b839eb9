//! Memoisation of filter results keyed on (table content, filter spec).
//!
//! Filtering is pure, so a result computed once can be handed to every later
//! caller with the same key. [`MemoCache`] additionally guarantees that at most
//! one computation per key is in flight: concurrent callers for the same key
//! wait for it and share its result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::data::filter::{self, FilterSpec};
use crate::data::model::{Fingerprint, Table};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fingerprint: Fingerprint,
    spec: FilterSpec,
}

impl CacheKey {
    pub fn new(table: &Table, spec: &FilterSpec) -> Self {
        CacheKey {
            fingerprint: table.fingerprint(),
            spec: spec.clone(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }
}

/// A pull-through cache for filtered tables.
pub trait FilterCache: Send + Sync {
    /// Return the table stored for `key`, or run `compute`, store its result
    /// and return it. Errors are returned and not stored.
    fn get_or_compute(
        &self,
        key: CacheKey,
        compute: &mut dyn FnMut() -> Result<Arc<Table>>,
    ) -> Result<Arc<Table>>;
}

/// Always recomputes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl FilterCache for NoCache {
    fn get_or_compute(
        &self,
        _key: CacheKey,
        compute: &mut dyn FnMut() -> Result<Arc<Table>>,
    ) -> Result<Arc<Table>> {
        compute()
    }
}

type Slot = Arc<Mutex<Option<Arc<Table>>>>;

/// Unbounded in-process cache with per-key mutual exclusion.
///
/// The key map lock is only held to find or create a slot; the slot lock is
/// held while computing. The map lock is never taken while a slot lock is
/// held. `compute` must not call back into the same cache with the same key.
#[derive(Debug, Default)]
pub struct MemoCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of stored results. Waits for computations in flight.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Drop the entry for `key` if it is still `slot` and holds nothing.
    /// A slot another caller is working on stays.
    fn discard_empty(&self, key: &CacheKey, slot: &Slot) {
        let mut slots = self.slots.lock();
        let unused = slots.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.try_lock().is_some_and(|stored| stored.is_none())
        });
        if unused {
            slots.remove(key);
        }
    }
}

impl FilterCache for MemoCache {
    fn get_or_compute(
        &self,
        key: CacheKey,
        compute: &mut dyn FnMut() -> Result<Arc<Table>>,
    ) -> Result<Arc<Table>> {
        let slot: Slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut guard = slot.lock();
        if let Some(table) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Filter cache hit ({} rows)", table.num_rows());
            return Ok(Arc::clone(table));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        match compute() {
            Ok(table) => {
                *guard = Some(Arc::clone(&table));
                debug!("Filter cache miss, stored {} rows", table.num_rows());
                Ok(table)
            }
            Err(e) => {
                drop(guard);
                self.discard_empty(&key, &slot);
                Err(e)
            }
        }
    }
}

/// [`filter::apply`] behind a [`FilterCache`]. Output is identical with any
/// cache, including [`NoCache`].
#[derive(Debug, Default)]
pub struct CachedFilterEngine<C: FilterCache = MemoCache> {
    cache: C,
}

impl<C: FilterCache> CachedFilterEngine<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn apply(&self, table: &Table, spec: &FilterSpec) -> Result<Arc<Table>> {
        let key = CacheKey::new(table, spec);
        self.cache
            .get_or_compute(key, &mut || filter::apply(table, spec).map(Arc::new))
    }
}
