//! Compiled program: what a host constructs before driving a simulation.
//!
//! An external compiler hands the engine a `Program`: the simulation entity
//! prototype, an entity-prototype store indexed by name, the compiled
//! callables referenced by handler groups, the unit conversion registry, and
//! the caster configuration. `Program` owns all of that and is the one thing
//! a host constructs before driving a [`crate::stepper::SimulationStepper`].

use ahash::AHashMap;

use crate::{
    callable::{CompiledCallable, HandlerGroup},
    convert::UnitConverter,
    entity::Entity,
    error::{EngineError, Phase},
};

/// A named, reusable entity template: the attribute set and handler groups an
/// entity of this type is constructed with. Distinct from [`Entity`] itself —
/// a prototype is stamped out once per instantiation (one per organism, one
/// per patch), each instance getting its own id and attribute map.
#[derive(Debug, Clone, Default)]
pub struct EntityPrototype {
    name: String,
    attribute_names: Vec<String>,
    handlers: Vec<(String, Phase, HandlerGroup)>,
    base_handlers: Vec<(String, HandlerGroup)>,
}

impl EntityPrototype {
    pub fn new(name: impl Into<String>, attribute_names: Vec<String>) -> Self {
        Self { name: name.into(), attribute_names, handlers: Vec::new(), base_handlers: Vec::new() }
    }

    #[must_use]
    pub fn with_handler(mut self, attribute: impl Into<String>, phase: Phase, group: HandlerGroup) -> Self {
        self.handlers.push((attribute.into(), phase, group));
        self
    }

    #[must_use]
    pub fn with_base_handler(mut self, attribute: impl Into<String>, group: HandlerGroup) -> Self {
        self.base_handlers.push((attribute.into(), group));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stamps out a fresh [`Entity`] with this prototype's attribute set and
    /// handler registrations, assigned the given id.
    pub fn instantiate(&self, id: u64) -> Entity {
        let mut entity = Entity::new(self.name.clone(), id, self.attribute_names.clone());
        for (attribute, phase, group) in &self.handlers {
            entity.register_handlers(attribute.clone(), *phase, group.clone());
        }
        for (attribute, group) in &self.base_handlers {
            entity.register_base_handlers(attribute.clone(), group.clone());
        }
        entity
    }
}

/// The compiled unit the engine runs: a prototype store indexed by name, the
/// distinguished simulation prototype, a named callable registry (so the
/// compiler can share one compiled closure across many handler
/// registrations instead of cloning it per site), the unit conversion
/// registry, and the decimal-favoring cast flag.
pub struct Program {
    simulation_name: String,
    prototypes: AHashMap<String, EntityPrototype>,
    callables: AHashMap<String, CompiledCallable>,
    converter: UnitConverter,
    favor_big_decimal: bool,
}

impl Program {
    pub fn new(simulation_name: impl Into<String>, converter: UnitConverter, favor_big_decimal: bool) -> Self {
        Self {
            simulation_name: simulation_name.into(),
            prototypes: AHashMap::new(),
            callables: AHashMap::new(),
            converter,
            favor_big_decimal,
        }
    }

    pub fn register_prototype(&mut self, prototype: EntityPrototype) {
        self.prototypes.insert(prototype.name().to_owned(), prototype);
    }

    pub fn register_callable(&mut self, name: impl Into<String>, callable: CompiledCallable) {
        self.callables.insert(name.into(), callable);
    }

    pub fn get_callable(&self, name: &str) -> Option<&CompiledCallable> {
        self.callables.get(name)
    }

    pub fn get_prototype(&self, name: &str) -> Option<&EntityPrototype> {
        self.prototypes.get(name)
    }

    /// The simulation entity prototype — the `meta` synthetic scope's backing
    /// entity.
    pub fn simulation_prototype(&self) -> Result<&EntityPrototype, EngineError> {
        self.prototypes
            .get(&self.simulation_name)
            .ok_or_else(|| EngineError::UnknownSimulation { name: self.simulation_name.clone() })
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    pub fn favor_big_decimal(&self) -> bool {
        self.favor_big_decimal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callable::{CompiledCallable, HandlerPair, Scope},
        value::Value,
    };

    #[test]
    fn prototype_instantiation_stamps_handlers_onto_a_fresh_entity() {
        let prototype = EntityPrototype::new("Tree", vec!["height".to_owned()]).with_handler(
            "height",
            Phase::Init,
            HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|_| Ok(Value::int(1))))]),
        );
        let entity = prototype.instantiate(7);
        assert_eq!(entity.id(), 7);
        assert!(!entity.has_no_handlers("height", Phase::Init));
    }

    #[test]
    fn unknown_simulation_name_errors() {
        let program = Program::new("Simulation", UnitConverter::new(), false);
        assert!(matches!(program.simulation_prototype(), Err(EngineError::UnknownSimulation { .. })));
    }

    #[test]
    fn simulation_prototype_resolves_when_registered() {
        let mut program = Program::new("Simulation", UnitConverter::new(), false);
        program.register_prototype(EntityPrototype::new("Simulation", vec![]));
        assert!(program.simulation_prototype().is_ok());
    }

    #[test]
    fn registered_callables_are_retrievable_by_name() {
        let mut program = Program::new("Simulation", UnitConverter::new(), false);
        program.register_callable("double_it", CompiledCallable::new(|scope| scope.get("x")));
        assert!(program.get_callable("double_it").is_some());
        assert!(program.get_callable("missing").is_none());
    }
}
