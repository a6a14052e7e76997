//! Exercises the `Program` / `EntityPrototype` construction path end to end:
//! a host stamps entities out of registered prototypes, wires them into the
//! stepper, and drives several steps through two-phase resolution and
//! organism discovery, built the way a real host would (via `Program`)
//! rather than poking `Entity` directly.

use std::{cell::RefCell, rc::Rc};

use josh_engine::{
    CompiledCallable, Entity, EntityPrototype, EntityRef, HandlerGroup, HandlerPair, OpContext, Phase, Program,
    RecordingExporter, Scalar, Scope, ShadowEntity, SimulationStepper, UnitConverter, Units, Value,
};

fn dummy_ctx<'a>() -> OpContext<'a> {
    let converter: &'static UnitConverter = Box::leak(Box::new(UnitConverter::new()));
    let rng: &'static mut rand_chacha::ChaCha8Rng = Box::leak(Box::new(<rand_chacha::ChaCha8Rng as rand::SeedableRng>::seed_from_u64(7)));
    OpContext { converter, favor_big_decimal: false, rng }
}

#[test]
fn program_driven_patch_accumulates_and_exports_each_step() {
    let mut program = Program::new("Simulation", UnitConverter::new(), false);
    program.register_prototype(EntityPrototype::new("Simulation", vec![]));

    let counter_prototype = EntityPrototype::new("Counter", vec!["count".to_owned()])
        .with_handler("count", Phase::Init, HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|_| Ok(Value::int(0))))]))
        .with_handler(
            "count",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(
                None,
                CompiledCallable::new(|scope| scope.get("prior.count")?.add(&Value::int(1), &mut dummy_ctx())),
            )]),
        );
    program.register_prototype(counter_prototype);

    let patch_entity: Entity = program.get_prototype("Counter").unwrap().instantiate(1);

    let mut stepper = SimulationStepper::new(Rc::new(RefCell::new(ShadowEntity::new(
        program.simulation_prototype().unwrap().instantiate(0),
    ))));
    stepper.register_patch("p1", Rc::new(RefCell::new(ShadowEntity::new(patch_entity))));

    let recorder = Rc::new(RefCell::new(RecordingExporter::new()));
    stepper.set_export_variables(vec!["count".to_owned()]);

    struct SharedExporter(Rc<RefCell<RecordingExporter>>);
    impl josh_engine::Exporter for SharedExporter {
        fn export(&mut self, step: u64, snapshot: &josh_engine::Snapshot, variables: &[String]) -> Result<(), josh_engine::EngineError> {
            self.0.borrow_mut().export(step, snapshot, variables)
        }
    }
    stepper.register_exporter(Box::new(SharedExporter(recorder.clone())));

    for _ in 0..3 {
        stepper.perform().unwrap();
    }

    assert_eq!(stepper.replicate().get_patch_by_key("p1", 0).unwrap().get_attribute_value("count").and_then(Value::as_int), Some(2));
    assert_eq!(recorder.borrow().calls.len(), 3);
}

#[test]
fn organism_produced_in_step_phase_is_discovered_for_the_next_step() {
    let mut tree = Entity::new("Tree", 99, vec![]);
    tree.register_base_handlers("noop", HandlerGroup::empty());
    let tree_shadow = Rc::new(RefCell::new(ShadowEntity::new(tree)));

    let mut patch = Entity::new("Patch", 1, vec!["trees".to_owned()]);
    let initial_ref = Scalar::EntityRef(EntityRef { type_name: "Tree".to_owned(), id: 99, mutable: true });
    patch
        .set_attribute_value("trees", Value::distribution(josh_engine::Distribution::realized(vec![initial_ref]).unwrap(), Units::empty()))
        .unwrap();
    patch.register_handlers(
        "trees",
        Phase::Step,
        HandlerGroup::new(vec![HandlerPair::new(
            None,
            CompiledCallable::new(|_| {
                let entity_ref = Scalar::EntityRef(EntityRef { type_name: "Tree".to_owned(), id: 99, mutable: true });
                Ok(Value::distribution(josh_engine::Distribution::realized(vec![entity_ref]).unwrap(), Units::empty()))
            }),
        )]),
    );

    let meta = Rc::new(RefCell::new(ShadowEntity::new(Entity::new("Simulation", 0, vec![]))));
    let mut stepper = SimulationStepper::new(meta);
    stepper.register_patch("p1", Rc::new(RefCell::new(ShadowEntity::new(patch))));
    stepper.register_organism("p1", 99, tree_shadow);

    stepper.perform().unwrap();
    let step0 = stepper.replicate().get_patch_by_key("p1", 0).unwrap();
    assert!(step0.get_attribute_value("trees").is_some());

    // A second step must still find the organism reachable via `trees`,
    // proving discovery ran after `end` rather than interleaving with
    // handler evaluation and losing the reference.
    stepper.perform().unwrap();
    let step1 = stepper.replicate().get_patch_by_key("p1", 0).unwrap();
    assert!(step1.get_attribute_value("trees").is_some());
}
