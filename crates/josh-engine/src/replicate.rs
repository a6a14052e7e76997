//! Replicate store.
//!
//! A sequence of per-step snapshots, each mapping geographic keys to frozen
//! entities, with indexed lookup by key and step offset.

use ahash::AHashMap;

use crate::entity::FrozenEntity;

/// One step's worth of frozen entities, keyed by geographic key.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    patches: AHashMap<String, FrozenEntity>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entity: FrozenEntity) {
        self.patches.insert(key.into(), entity);
    }

    pub fn get_by_key(&self, key: &str) -> Option<&FrozenEntity> {
        self.patches.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.patches.keys()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// A query against the replicate: either every patch matching a geometry
/// predicate, a single point lookup, or a direct key lookup, all at a given
/// step offset (0 = current, negative = prior).
pub enum Query<'a> {
    Geometry { step_offset: i64, predicate: &'a dyn Fn(&FrozenEntity) -> bool },
    Key { step_offset: i64, key: &'a str },
}

/// Content-addressed token identifying a geometry predicate for cache
/// purposes. This crate has no geometry module of its own, so callers mint
/// their own tokens for predicates they intend to reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryToken(pub String);

/// Holds per-step snapshots indexed by absolute step number.
#[derive(Debug, Clone, Default)]
pub struct Replicate {
    snapshots: Vec<Snapshot>,
}

impl Replicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next step's snapshot. Must be called in step order; the
    /// resulting absolute step number is `len() - 1` after insertion.
    pub fn push_snapshot(&mut self, snapshot: Snapshot) -> u64 {
        self.snapshots.push(snapshot);
        (self.snapshots.len() - 1) as u64
    }

    pub fn step_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn current_step(&self) -> Option<u64> {
        self.step_count().checked_sub(1).map(|n| n as u64)
    }

    /// Resolves a step offset (0 = current, negative = prior) against the
    /// current step, returning `None` if it underflows or overflows.
    fn resolve_step(&self, step_offset: i64) -> Option<usize> {
        let current = self.current_step()? as i64;
        let absolute = current + step_offset;
        if absolute < 0 || absolute as usize >= self.snapshots.len() {
            None
        } else {
            Some(absolute as usize)
        }
    }

    pub fn get_patch_by_key(&self, key: &str, step_offset: i64) -> Option<&FrozenEntity> {
        let idx = self.resolve_step(step_offset)?;
        self.snapshots[idx].get_by_key(key)
    }

    pub fn query(&self, query: &Query) -> Vec<&FrozenEntity> {
        match query {
            Query::Key { step_offset, key } => self.get_patch_by_key(key, *step_offset).into_iter().collect(),
            Query::Geometry { step_offset, predicate } => {
                let Some(idx) = self.resolve_step(*step_offset) else { return Vec::new() };
                self.snapshots[idx].patches.values().filter(|e| predicate(e)).collect()
            }
        }
    }
}

/// Memoizes geometry-token -> matching-key-set lookups for the current step;
/// invalidated wholesale on every new snapshot.
#[derive(Debug, Default)]
pub struct QueryCache {
    step: Option<u64>,
    cache: AHashMap<GeometryToken, Vec<String>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the cache if `current_step` has advanced since the last lookup.
    pub fn invalidate_if_stale(&mut self, current_step: Option<u64>) {
        if self.step != current_step {
            self.cache.clear();
            self.step = current_step;
        }
    }

    pub fn get_or_compute(&mut self, token: GeometryToken, compute: impl FnOnce() -> Vec<String>) -> &[String] {
        self.cache.entry(token).or_insert_with(compute)
    }
}
