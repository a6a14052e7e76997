//! Interning table for units and language types.
//!
//! Units and language types are value objects, interned where convenient. An
//! insertion-only table keyed by canonical string form, generalized from
//! identifier interning to any `Display`-canonical value type.

use std::{collections::HashMap, fmt::Display, sync::Arc};

/// Insertion-only interner keyed by a value's canonical (`Display`) form.
/// Never evicts — handlers are registered once at program-build time and
/// units/language types live for the lifetime of the program.
pub struct Interner<T> {
    by_key: HashMap<String, Arc<T>>,
}

impl<T: Display> Interner<T> {
    pub fn new() -> Self {
        Self { by_key: HashMap::new() }
    }

    /// Returns the interned instance for `value`'s canonical form, inserting
    /// it if this is the first time that form has been seen.
    pub fn intern(&mut self, value: T) -> Arc<T> {
        let key = value.to_string();
        self.by_key.entry(key).or_insert_with(|| Arc::new(value)).clone()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl<T: Display> Default for Interner<T> {
    fn default() -> Self {
        Self::new()
    }
}
