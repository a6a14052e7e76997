//! Compiled callables and handler groups.
//!
//! A `CompiledCallable` is an opaque closure `scope -> Value`, produced by an
//! external compiler and referenced by handler groups. Callables close over
//! already-compiled state and need no bytecode/frame machinery of their own.

use std::{fmt, sync::Arc};

use crate::{error::EngineError, value::Value};

/// The scope contract callables receive: attribute lookup by name, existence
/// check, and the set of names currently resolvable. Implemented by the
/// shadow entity.
pub trait Scope {
    fn get(&mut self, name: &str) -> Result<Value, EngineError>;
    fn has(&self, name: &str) -> bool;
    fn get_attributes(&self) -> Vec<String>;
}

/// `apply(scope) -> Value`. Boxed behind `Arc` so handler groups stay cheap
/// to clone; callables never mutate their own closed-over state.
#[derive(Clone)]
pub struct CompiledCallable {
    inner: Arc<dyn Fn(&mut dyn Scope) -> Result<Value, EngineError> + Send + Sync>,
}

impl fmt::Debug for CompiledCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledCallable").finish_non_exhaustive()
    }
}

impl CompiledCallable {
    pub fn new(f: impl Fn(&mut dyn Scope) -> Result<Value, EngineError> + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn apply(&self, scope: &mut dyn Scope) -> Result<Value, EngineError> {
        (self.inner)(scope)
    }
}

/// A selector callable; `None` is treated as an always-true selector.
pub type Selector = CompiledCallable;

/// One `(optional-selector, body)` pair in a handler group.
#[derive(Debug, Clone)]
pub struct HandlerPair {
    pub selector: Option<Selector>,
    pub body: CompiledCallable,
}

impl HandlerPair {
    pub fn new(selector: Option<Selector>, body: CompiledCallable) -> Self {
        Self { selector, body }
    }

    /// Evaluates the selector (absent ≡ true) against `scope`.
    fn selector_matches(&self, scope: &mut dyn Scope) -> Result<bool, EngineError> {
        match &self.selector {
            None => Ok(true),
            Some(sel) => sel.apply(scope).map(|v| v.as_boolean().unwrap_or(false)),
        }
    }
}

/// The ordered list of `(selector, body)` pairs registered for one
/// `(attribute, phase)`.
#[derive(Debug, Clone, Default)]
pub struct HandlerGroup {
    pairs: Vec<HandlerPair>,
}

impl HandlerGroup {
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn new(pairs: Vec<HandlerPair>) -> Self {
        Self { pairs }
    }

    pub fn push(&mut self, pair: HandlerPair) {
        self.pairs.push(pair);
    }

    /// Iterates handlers in registration order, evaluating selectors until
    /// the first true one, then evaluates and returns that body's value.
    /// Returns `Ok(None)` if no selector matched; the caller should carry the
    /// prior value forward in that case.
    pub fn resolve(&self, scope: &mut dyn Scope) -> Result<Option<Value>, EngineError> {
        for pair in &self.pairs {
            if pair.selector_matches(scope)? {
                return pair.body.apply(scope).map(Some);
            }
        }
        Ok(None)
    }
}
