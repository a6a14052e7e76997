//! Entity model.
//!
//! A named, typed record holding a mutable attribute map and a registry of
//! event-handler groups keyed by `(attribute, phase)`, with optional
//! parent/child (patch -> organism) links. The attribute map is an
//! `IndexMap` rather than a plain hash map, so attribute iteration order
//! (export column order, freeze round-tripping) follows declaration/write
//! order instead of hash order.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    callable::HandlerGroup,
    error::{EngineError, Phase},
    value::Value,
};

/// An entity's attribute names are fixed at construction; writing past that
/// set is an error, never an insertion.
#[derive(Debug, Clone)]
pub struct Entity {
    type_name: String,
    attribute_names: Vec<String>,
    attributes: IndexMap<String, Value>,
    handlers: AHashMap<(String, Phase), HandlerGroup>,
    /// Phase-independent fallback handlers, keyed by attribute only.
    base_handlers: AHashMap<String, HandlerGroup>,
    parent: Option<u64>,
    geo_key: Option<String>,
    id: u64,
}

impl Entity {
    pub fn new(type_name: impl Into<String>, id: u64, attribute_names: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attribute_names,
            attributes: IndexMap::new(),
            handlers: AHashMap::new(),
            base_handlers: AHashMap::new(),
            parent: None,
            geo_key: None,
            id,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    #[must_use]
    pub fn with_parent(mut self, parent: u64) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn geo_key(&self) -> Option<&str> {
        self.geo_key.as_deref()
    }

    #[must_use]
    pub fn with_geo_key(mut self, key: impl Into<String>) -> Self {
        self.geo_key = Some(key.into());
        self
    }

    pub fn get_attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    fn check_known(&self, name: &str) -> Result<(), EngineError> {
        if self.attribute_names.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(EngineError::UnknownAttribute { entity: self.type_name.clone(), attribute: name.to_owned() })
        }
    }

    pub fn get_attribute_value(&self, name: &str) -> Result<Option<&Value>, EngineError> {
        self.check_known(name)?;
        Ok(self.attributes.get(name))
    }

    pub fn set_attribute_value(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        self.check_known(name)?;
        self.attributes.insert(name.to_owned(), value);
        Ok(())
    }

    /// Registers a handler group for `(attribute, phase)`. Called once at
    /// program-build time; handlers never change at runtime after that.
    pub fn register_handlers(&mut self, attribute: impl Into<String>, phase: Phase, group: HandlerGroup) {
        self.handlers.insert((attribute.into(), phase), group);
    }

    /// Registers a phase-independent fallback group for `attribute`.
    pub fn register_base_handlers(&mut self, attribute: impl Into<String>, group: HandlerGroup) {
        self.base_handlers.insert(attribute.into(), group);
    }

    /// Returns at most one handler group for `(attribute, phase)`, falling
    /// back to the base (phase-independent) group if no phase-specific one
    /// is registered.
    pub fn get_event_handlers(&self, attribute: &str, phase: Phase) -> Option<&HandlerGroup> {
        self.handlers.get(&(attribute.to_owned(), phase)).or_else(|| self.base_handlers.get(attribute))
    }

    /// Fast-path hint: true if neither a phase-specific nor a base handler
    /// group exists for `attribute` — the shadow entity can skip straight to
    /// carrying the prior value forward.
    pub fn has_no_handlers(&self, attribute: &str, phase: Phase) -> bool {
        self.get_event_handlers(attribute, phase).is_none()
    }

    /// Snapshots the current attribute map into an immutable [`FrozenEntity`].
    pub fn freeze(&self) -> FrozenEntity {
        FrozenEntity {
            type_name: self.type_name.clone(),
            id: self.id,
            attributes: self.attributes.clone(),
            parent: self.parent,
            geo_key: self.geo_key.clone(),
        }
    }
}

/// An immutable snapshot of an entity's attribute map. Has no handlers and
/// cannot participate in step execution.
#[derive(Debug, Clone)]
pub struct FrozenEntity {
    type_name: String,
    id: u64,
    attributes: IndexMap<String, Value>,
    parent: Option<u64>,
    geo_key: Option<String>,
}

impl FrozenEntity {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    pub fn geo_key(&self) -> Option<&str> {
        self.geo_key.as_deref()
    }

    pub fn get_attribute_value(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Units;

    fn entity() -> Entity {
        Entity::new("Tree", 1, vec!["height".to_owned(), "age".to_owned()])
    }

    #[test]
    fn unknown_attribute_write_fails() {
        let mut e = entity();
        assert!(e.set_attribute_value("girth", Value::int(1)).is_err());
    }

    #[test]
    fn known_attribute_roundtrips() {
        let mut e = entity();
        e.set_attribute_value("height", Value::scalar(crate::value::Scalar::Int(3), Units::atom("meter"))).unwrap();
        assert_eq!(e.get_attribute_value("height").unwrap().unwrap().as_int(), Some(3));
    }

    #[test]
    fn has_no_handlers_is_true_when_nothing_registered() {
        let e = entity();
        assert!(e.has_no_handlers("height", Phase::Step));
    }

    #[test]
    fn freeze_round_trips_attribute_values() {
        let mut e = entity();
        e.set_attribute_value("age", Value::int(5)).unwrap();
        let frozen = e.freeze();
        assert_eq!(frozen.get_attribute_value("age").and_then(Value::as_int), Some(5));
        assert_eq!(frozen.type_name(), "Tree");
    }

    #[test]
    fn base_handler_is_fallback_for_unregistered_phase() {
        let mut e = entity();
        e.register_base_handlers("height", HandlerGroup::empty());
        assert!(!e.has_no_handlers("height", Phase::Init));
        assert!(e.get_event_handlers("height", Phase::Init).is_some());
    }
}
