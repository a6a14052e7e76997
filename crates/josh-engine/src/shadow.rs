//! Shadow entity — the evaluator.
//!
//! Decorates a mutable [`Entity`] for exactly one step, providing lazy,
//! memoized, phase-aware attribute resolution with a strict prior/current
//! dualism: a resolution stack tracks attributes currently being resolved
//! for cycle detection, re-armed once per substep rather than once per call
//! frame.
//!
//! Dotted synthetic-scope access (`prior.x`, `here.x`, `meta.x`) is not a
//! parser concern in this crate — an external compiler emits these names.
//! The convention adopted here is that the compiler flattens dotted access
//! into a single scope key at compile time (e.g. `"prior.height"`), which
//! `Scope::get` recognizes by prefix.

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use ahash::AHashMap;

use crate::{
    callable::Scope,
    entity::Entity,
    error::{EngineError, ErrorContext, Phase},
    resource::RecursionTracker,
    units::Units,
    value::{EntityRef, Scalar, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShadowState {
    Idle,
    InSubstep(Phase),
}

/// Shared handle to a shadow entity, used for the `here`/`meta` synthetic
/// links so multiple organism shadows can reference one patch or simulation
/// shadow without ownership conflicts.
pub type ShadowHandle = Rc<RefCell<ShadowEntity>>;

pub struct ShadowEntity {
    entity: Entity,
    prior_snapshot: Option<AHashMap<String, Value>>,
    resolved_this_substep: AHashMap<String, Value>,
    being_resolved: HashSet<String>,
    recursion: RecursionTracker,
    state: ShadowState,
    here: Option<ShadowHandle>,
    meta: Option<ShadowHandle>,
}

impl ShadowEntity {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            prior_snapshot: None,
            resolved_this_substep: AHashMap::new(),
            being_resolved: HashSet::new(),
            recursion: RecursionTracker::default(),
            state: ShadowState::Idle,
            here: None,
            meta: None,
        }
    }

    #[must_use]
    pub fn with_here(mut self, here: ShadowHandle) -> Self {
        self.here = Some(here);
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: ShadowHandle) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    /// Resets the prior/current dualism at the start of a new absolute step.
    /// Must be called once per step, before the first `start_substep`.
    pub fn begin_step(&mut self) {
        self.prior_snapshot = None;
        self.state = ShadowState::Idle;
    }

    /// Idle -> InSubstep(phase). Snapshots the prior map on the step's first
    /// substep only. Starting while already in a substep is a fatal
    /// programmer error.
    pub fn start_substep(&mut self, phase: Phase) -> Result<(), EngineError> {
        if self.state != ShadowState::Idle {
            return Err(EngineError::IllegalSubstepState {
                reason: format!("startSubstep({phase}) called while already InSubstep"),
            });
        }
        if self.prior_snapshot.is_none() {
            let snapshot: AHashMap<String, Value> = self
                .entity
                .get_attribute_names()
                .iter()
                .filter_map(|name| self.entity.get_attribute_value(name).ok().flatten().map(|v| (name.clone(), v.clone())))
                .collect();
            self.prior_snapshot = Some(snapshot);
        }
        self.state = ShadowState::InSubstep(phase);
        self.resolved_this_substep.clear();
        self.being_resolved.clear();
        self.recursion = RecursionTracker::default();
        Ok(())
    }

    /// InSubstep -> Idle. Ending while not in a substep is a fatal error.
    pub fn end_substep(&mut self) -> Result<(), EngineError> {
        if !matches!(self.state, ShadowState::InSubstep(_)) {
            return Err(EngineError::IllegalSubstepState { reason: "endSubstep() called while Idle".to_owned() });
        }
        self.state = ShadowState::Idle;
        Ok(())
    }

    fn current_phase(&self) -> Result<Phase, EngineError> {
        match self.state {
            ShadowState::InSubstep(p) => Ok(p),
            ShadowState::Idle => Err(EngineError::IllegalSubstepState {
                reason: "attribute resolution requested outside a substep".to_owned(),
            }),
        }
    }

    /// `getPriorAttribute(name)`: the pre-substep value, stable for the whole
    /// step and independent of any write made later in the same step —
    /// including a write from this entity's own `init` substep. Never falls
    /// back to the live attribute: doing so would let a substep's own write
    /// leak into what is supposed to be a frozen baseline.
    ///
    /// An attribute with no value before the step began (never yet assigned,
    /// e.g. on its very first step) has nothing to carry forward. That is a
    /// normal state, not a programmer error, so it resolves to the zero
    /// value rather than failing the step.
    pub fn get_prior_attribute(&self, name: &str) -> Result<Value, EngineError> {
        self.entity.get_attribute_value(name)?;
        if let Some(v) = self.prior_snapshot.as_ref().and_then(|m| m.get(name)) {
            return Ok(v.clone());
        }
        Ok(Value::int(0))
    }

    /// Core attribute resolution algorithm.
    pub fn get_attribute_value(&mut self, name: &str) -> Result<Value, EngineError> {
        // Validates the attribute is registered; surfaces unknown-attribute early.
        self.entity.get_attribute_value(name)?;

        if let Some(cached) = self.resolved_this_substep.get(name) {
            return Ok(cached.clone());
        }
        if !self.being_resolved.insert(name.to_owned()) {
            return Err(EngineError::CircularDependency {
                entity: self.entity.type_name().to_owned(),
                attribute: name.to_owned(),
                context: ErrorContext::new().with_attribute(name).with_phase(self.current_phase()?),
            });
        }
        self.recursion.try_enter()?;
        let result = self.resolve_uncached(name);
        self.recursion.exit();
        self.being_resolved.remove(name);

        let value = result?;
        self.resolved_this_substep.insert(name.to_owned(), value.clone());
        Ok(value)
    }

    fn resolve_uncached(&mut self, name: &str) -> Result<Value, EngineError> {
        let phase = self.current_phase()?;

        if self.entity.has_no_handlers(name, phase) {
            return self.get_prior_attribute(name);
        }

        let group = self.entity.get_event_handlers(name, phase).cloned().expect("checked has_no_handlers above");
        match group.resolve(self)? {
            Some(value) => {
                self.entity.set_attribute_value(name, value.clone())?;
                Ok(value)
            }
            None => self.get_prior_attribute(name),
        }
    }

    fn self_entity_ref(&self) -> Value {
        let type_name = self.entity.type_name().to_owned();
        Value::scalar(
            Scalar::EntityRef(EntityRef { type_name: type_name.clone(), id: self.entity.id(), mutable: true }),
            Units::atom(type_name),
        )
    }
}

impl Scope for ShadowEntity {
    fn get(&mut self, name: &str) -> Result<Value, EngineError> {
        match name {
            "current" | "prior" => Ok(self.self_entity_ref()),
            "here" => self.here.as_ref().map(|h| h.borrow().self_entity_ref()).ok_or_else(|| {
                EngineError::UnknownAttribute { entity: self.entity.type_name().to_owned(), attribute: "here".to_owned() }
            }),
            "meta" => self.meta.as_ref().map(|h| h.borrow().self_entity_ref()).ok_or_else(|| {
                EngineError::UnknownAttribute { entity: self.entity.type_name().to_owned(), attribute: "meta".to_owned() }
            }),
            _ => {
                if let Some(rest) = name.strip_prefix("prior.") {
                    return self.get_prior_attribute(rest);
                }
                if let Some(rest) = name.strip_prefix("current.") {
                    return self.get_attribute_value(rest);
                }
                if let Some(rest) = name.strip_prefix("here.") {
                    let here = self.here.clone().ok_or_else(|| EngineError::UnknownAttribute {
                        entity: self.entity.type_name().to_owned(),
                        attribute: name.to_owned(),
                    })?;
                    return here.borrow_mut().get_attribute_value(rest);
                }
                if let Some(rest) = name.strip_prefix("meta.") {
                    let meta = self.meta.clone().ok_or_else(|| EngineError::UnknownAttribute {
                        entity: self.entity.type_name().to_owned(),
                        attribute: name.to_owned(),
                    })?;
                    return meta.borrow_mut().get_attribute_value(rest);
                }
                self.get_attribute_value(name)
            }
        }
    }

    fn has(&self, name: &str) -> bool {
        matches!(name, "current" | "prior" | "here" | "meta")
            || self.entity.get_attribute_names().iter().any(|n| n == name)
    }

    fn get_attributes(&self) -> Vec<String> {
        self.entity.get_attribute_names().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::{CompiledCallable, HandlerGroup, HandlerPair};

    fn shadow_with_attr(value: i64) -> ShadowEntity {
        let mut e = Entity::new("Tree", 1, vec!["height".to_owned()]);
        e.set_attribute_value("height", Value::int(value)).unwrap();
        ShadowEntity::new(e)
    }

    #[test]
    fn fast_path_carries_prior_forward() {
        let mut shadow = shadow_with_attr(5);
        shadow.begin_step();
        shadow.start_substep(Phase::Step).unwrap();
        let v = shadow.get_attribute_value("height").unwrap();
        assert_eq!(v.as_int(), Some(5));
    }

    #[test]
    fn resolution_is_memoized_within_a_substep() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let mut e = Entity::new("Tree", 1, vec!["height".to_owned()]);
        e.set_attribute_value("height", Value::int(1)).unwrap();
        e.register_handlers(
            "height",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(
                None,
                CompiledCallable::new(move |_| {
                    calls_clone.set(calls_clone.get() + 1);
                    Ok(Value::int(9))
                }),
            )]),
        );
        let mut shadow = ShadowEntity::new(e);
        shadow.begin_step();
        shadow.start_substep(Phase::Step).unwrap();
        let _ = shadow.get_attribute_value("height").unwrap();
        let _ = shadow.get_attribute_value("height").unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn circular_dependency_is_detected() {
        let mut e = Entity::new("Tree", 1, vec!["a".to_owned(), "b".to_owned()]);
        e.set_attribute_value("a", Value::int(1)).unwrap();
        e.set_attribute_value("b", Value::int(1)).unwrap();
        e.register_handlers(
            "a",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|scope| scope.get("b")))]),
        );
        e.register_handlers(
            "b",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|scope| scope.get("a")))]),
        );
        let mut shadow = ShadowEntity::new(e);
        shadow.begin_step();
        shadow.start_substep(Phase::Step).unwrap();
        assert!(matches!(shadow.get_attribute_value("a"), Err(EngineError::CircularDependency { .. })));
    }

    #[test]
    fn starting_substep_twice_is_illegal() {
        let mut shadow = shadow_with_attr(1);
        shadow.begin_step();
        shadow.start_substep(Phase::Step).unwrap();
        assert!(matches!(shadow.start_substep(Phase::Step), Err(EngineError::IllegalSubstepState { .. })));
    }

    #[test]
    fn prior_is_stable_across_two_substeps_of_the_same_step() {
        let mut e = Entity::new("Tree", 1, vec!["a".to_owned()]);
        e.set_attribute_value("a", Value::int(1)).unwrap();
        e.register_handlers(
            "a",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|_| Ok(Value::int(100))))]),
        );
        let mut shadow = ShadowEntity::new(e);
        shadow.begin_step();

        shadow.start_substep(Phase::Start).unwrap();
        let prior_at_start = shadow.get_prior_attribute("a").unwrap();
        shadow.end_substep().unwrap();

        shadow.start_substep(Phase::Step).unwrap();
        let _ = shadow.get_attribute_value("a").unwrap(); // writes 100 back to the entity
        let prior_at_step = shadow.get_prior_attribute("a").unwrap();
        shadow.end_substep().unwrap();

        assert_eq!(prior_at_start.as_int(), prior_at_step.as_int());
    }

    #[test]
    fn prior_never_falls_back_to_a_same_step_write() {
        let mut e = Entity::new("Tree", 1, vec!["a".to_owned()]);
        e.register_handlers(
            "a",
            Phase::Init,
            HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|_| Ok(Value::int(1))))]),
        );
        let mut shadow = ShadowEntity::new(e);
        shadow.begin_step();

        shadow.start_substep(Phase::Init).unwrap();
        let written = shadow.get_attribute_value("a").unwrap();
        assert_eq!(written.as_int(), Some(1));
        let prior_during_init = shadow.get_prior_attribute("a").unwrap();
        shadow.end_substep().unwrap();

        assert_eq!(prior_during_init.as_int(), Some(0));
    }

    #[test]
    fn unknown_attribute_errors() {
        let mut shadow = shadow_with_attr(1);
        shadow.begin_step();
        shadow.start_substep(Phase::Step).unwrap();
        assert!(matches!(shadow.get_attribute_value("girth"), Err(EngineError::UnknownAttribute { .. })));
    }

    #[test]
    fn recursion_depth_is_bounded_for_acyclic_chains() {
        // A chain of attributes a0 -> a1 -> ... each depending on the next via
        // `scope.get`, deep enough to exceed the default recursion ceiling
        // without ever repeating an attribute (so it's not a cycle).
        let names: Vec<String> = (0..(crate::resource::DEFAULT_MAX_DEPTH + 10)).map(|i| format!("a{i}")).collect();
        let mut e = Entity::new("Chain", 1, names.clone());
        for (i, name) in names.iter().enumerate() {
            e.set_attribute_value(name, Value::int(0)).unwrap();
            if i + 1 < names.len() {
                let next = names[i + 1].clone();
                e.register_handlers(
                    name.clone(),
                    Phase::Step,
                    HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(move |scope| scope.get(&next)))]),
                );
            } else {
                e.register_handlers(
                    name.clone(),
                    Phase::Step,
                    HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|_| Ok(Value::int(1))))]),
                );
            }
        }
        let mut shadow = ShadowEntity::new(e);
        shadow.begin_step();
        shadow.start_substep(Phase::Step).unwrap();
        assert!(matches!(shadow.get_attribute_value("a0"), Err(EngineError::IllegalSubstepState { .. })));
    }
}
