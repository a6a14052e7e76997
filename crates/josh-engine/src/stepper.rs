//! Simulation stepper.
//!
//! Drives the phase order (`init` once at step 0, then `start` -> `step` ->
//! `end` every step) across patches and their organisms, then performs the
//! organism-discovery pass as a distinct step after `end` — deliberately not
//! interleaving discovery with handler evaluation, which is what causes
//! organism collections to stop advancing across steps when an attribute has
//! both a `step` handler that creates organisms and an `end` handler that
//! reads the same attribute.

use ahash::AHashMap;
use tracing::{instrument, warn};

use crate::{
    entity::Entity,
    error::{EngineError, Phase},
    external::Exporter,
    replicate::{Replicate, Snapshot},
    shadow::{ShadowEntity, ShadowHandle},
    value::{Scalar, Value},
};

pub struct SimulationStepper {
    replicate: Replicate,
    /// Stable replicate-key iteration order.
    patches: Vec<String>,
    patch_shadows: AHashMap<String, ShadowHandle>,
    /// Active organism ids per patch, in insertion order.
    organisms: AHashMap<String, Vec<u64>>,
    organism_shadows: AHashMap<u64, ShadowHandle>,
    meta: ShadowHandle,
    absolute_step: u64,
    exporters: Vec<Box<dyn Exporter>>,
    /// Deterministic variable ordering handed to exporters each step.
    export_variables: Vec<String>,
}

impl SimulationStepper {
    pub fn new(meta: ShadowHandle) -> Self {
        Self {
            replicate: Replicate::new(),
            patches: Vec::new(),
            patch_shadows: AHashMap::new(),
            organisms: AHashMap::new(),
            organism_shadows: AHashMap::new(),
            meta,
            absolute_step: 0,
            exporters: Vec::new(),
            export_variables: Vec::new(),
        }
    }

    /// Registers an exporter, notified with `(step, snapshot, variables)`
    /// after every successfully committed step.
    pub fn register_exporter(&mut self, exporter: Box<dyn Exporter>) {
        self.exporters.push(exporter);
    }

    /// Sets the deterministic variable list passed to exporters each step.
    pub fn set_export_variables(&mut self, variables: Vec<String>) {
        self.export_variables = variables;
    }

    /// Registers a patch under `key`, appended to the stable iteration order.
    pub fn register_patch(&mut self, key: impl Into<String>, shadow: ShadowHandle) {
        let key = key.into();
        self.patches.push(key.clone());
        self.patch_shadows.insert(key.clone(), shadow);
        self.organisms.entry(key).or_default();
    }

    /// Registers an organism, initially active on `patch_key`, in insertion order.
    pub fn register_organism(&mut self, patch_key: &str, id: u64, shadow: ShadowHandle) {
        self.organism_shadows.insert(id, shadow);
        self.organisms.entry(patch_key.to_owned()).or_default().push(id);
    }

    pub fn replicate(&self) -> &Replicate {
        &self.replicate
    }

    pub fn absolute_step(&self) -> u64 {
        self.absolute_step
    }

    /// Executes one absolute step across all active phases. On success,
    /// freezes and appends the new snapshot and returns its absolute step
    /// number. On handler failure the step is aborted, no snapshot is
    /// produced, and all entities are rolled back to their pre-step state —
    /// partial writes from that substep are discarded.
    #[instrument(skip(self), fields(absolute_step = self.absolute_step))]
    pub fn perform(&mut self) -> Result<u64, EngineError> {
        let phases: &[Phase] =
            if self.absolute_step == 0 { &[Phase::Init, Phase::Start, Phase::Step, Phase::End] } else { &[Phase::Start, Phase::Step, Phase::End] };

        let backup_patches: Vec<(String, Entity)> =
            self.patch_shadows.iter().map(|(k, s)| (k.clone(), s.borrow().entity().clone())).collect();
        let backup_organisms: Vec<(u64, Entity)> =
            self.organism_shadows.iter().map(|(id, s)| (*id, s.borrow().entity().clone())).collect();

        for shadow in self.patch_shadows.values() {
            shadow.borrow_mut().begin_step();
        }
        for shadow in self.organism_shadows.values() {
            shadow.borrow_mut().begin_step();
        }
        self.meta.borrow_mut().begin_step();

        match self.run_phases(phases) {
            Ok(()) => {
                let snapshot = self.freeze_snapshot();
                let step = self.replicate.push_snapshot(snapshot.clone());
                self.absolute_step += 1;
                for exporter in &mut self.exporters {
                    exporter.export(step, &snapshot, &self.export_variables)?;
                }
                Ok(step)
            }
            Err(err) => {
                for (key, entity) in backup_patches {
                    *self.patch_shadows[&key].borrow_mut().entity_mut() = entity;
                }
                for (id, entity) in backup_organisms {
                    if let Some(shadow) = self.organism_shadows.get(&id) {
                        *shadow.borrow_mut().entity_mut() = entity;
                    }
                }
                Err(err)
            }
        }
    }

    fn run_phases(&mut self, phases: &[Phase]) -> Result<(), EngineError> {
        for &phase in phases {
            let patch_keys = self.patches.clone();
            for key in patch_keys {
                let patch_shadow = self.patch_shadows[&key].clone();
                run_entity_substep(&patch_shadow, phase)?;

                let organism_ids = self.organisms.get(&key).cloned().unwrap_or_default();
                for id in organism_ids {
                    if let Some(shadow) = self.organism_shadows.get(&id).cloned() {
                        run_entity_substep(&shadow, phase)?;
                    }
                }

                if phase == Phase::End {
                    self.discover_organisms(&key)?;
                }
            }
        }
        Ok(())
    }

    /// Organism discovery pass: collects every entity-ref reachable from the
    /// patch's attributes, recursing
    /// into discovered organisms' own attributes, and replaces the patch's
    /// active organism set with exactly what was found. Ids with no known
    /// shadow (never instantiated through the prototype store) are dropped
    /// with a warning rather than silently fabricated.
    fn discover_organisms(&mut self, patch_key: &str) -> Result<(), EngineError> {
        let patch_shadow = self.patch_shadows[patch_key].clone();
        let discovered = collect_reachable_entity_refs(&patch_shadow, &self.organism_shadows)?;

        let mut next = Vec::with_capacity(discovered.len());
        for id in discovered {
            if self.organism_shadows.contains_key(&id) {
                next.push(id);
            } else {
                warn!(entity_id = id, patch = patch_key, "discovered organism id has no known shadow; skipping");
            }
        }
        self.organisms.insert(patch_key.to_owned(), next);
        Ok(())
    }

    fn freeze_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for key in &self.patches {
            let shadow = &self.patch_shadows[key];
            snapshot.insert(key.clone(), shadow.borrow().entity().freeze());
        }
        snapshot
    }
}

fn run_entity_substep(shadow: &ShadowHandle, phase: Phase) -> Result<(), EngineError> {
    let mut s = shadow.borrow_mut();
    s.start_substep(phase)?;
    let names = s.entity().get_attribute_names().to_vec();
    for name in &names {
        s.get_attribute_value(name)?;
    }
    s.end_substep()
}

/// Walks `patch_shadow`'s attributes for entity-refs, recursing into any
/// discovered organism's own attributes (bounded by `known` so it can't loop
/// forever on a reference cycle between organisms).
fn collect_reachable_entity_refs(
    patch_shadow: &ShadowHandle,
    known: &AHashMap<u64, ShadowHandle>,
) -> Result<Vec<u64>, EngineError> {
    let mut seen = std::collections::HashSet::new();
    let mut order = Vec::new();
    let mut stack = entity_refs_in(&patch_shadow.borrow())?;

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        if let Some(shadow) = known.get(&id) {
            stack.extend(entity_refs_in(&shadow.borrow())?);
        }
    }
    Ok(order)
}

fn entity_refs_in(shadow: &ShadowEntity) -> Result<Vec<u64>, EngineError> {
    let mut ids = Vec::new();
    for name in shadow.entity().get_attribute_names() {
        if let Some(value) = shadow.entity().get_attribute_value(name)? {
            collect_from_value(value, &mut ids);
        }
    }
    Ok(ids)
}

fn collect_from_value(value: &Value, out: &mut Vec<u64>) {
    if let Some(entity_ref) = value.as_entity() {
        out.push(entity_ref.id);
        return;
    }
    if let Some(dist) = value.as_distribution() {
        if let Some(elements) = dist.as_realized() {
            for element in elements {
                if let Scalar::EntityRef(entity_ref) = element {
                    out.push(entity_ref.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callable::{CompiledCallable, HandlerGroup, HandlerPair, Scope},
        distribution::Distribution,
        external::RecordingExporter,
        units::Units,
        value::EntityRef,
    };
    use std::{cell::RefCell, rc::Rc};

    fn meta_shadow() -> ShadowHandle {
        Rc::new(RefCell::new(ShadowEntity::new(Entity::new("Simulation", 0, vec![]))))
    }

    #[test]
    fn two_phase_resolution_across_three_steps() {
        // a.init = 1; a.step = prior.a + 1; b.step = a * 2
        let mut patch = Entity::new("Patch", 1, vec!["a".to_owned(), "b".to_owned()]);
        patch.register_handlers(
            "a",
            Phase::Init,
            HandlerGroup::new(vec![HandlerPair::new(None, CompiledCallable::new(|_| Ok(Value::int(1))))]),
        );
        patch.register_handlers(
            "a",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(
                None,
                CompiledCallable::new(|scope| {
                    let prior = scope.get("prior.a")?;
                    prior.add(&Value::int(1), &mut dummy_ctx())
                }),
            )]),
        );
        patch.register_handlers(
            "b",
            Phase::Step,
            HandlerGroup::new(vec![HandlerPair::new(
                None,
                CompiledCallable::new(|scope| {
                    let a = scope.get("current.a").or_else(|_| scope.get("a"))?;
                    a.multiply(&Value::int(2), &mut dummy_ctx())
                }),
            )]),
        );

        let mut stepper = SimulationStepper::new(meta_shadow());
        stepper.register_patch("p1", Rc::new(RefCell::new(ShadowEntity::new(patch))));

        stepper.perform().unwrap(); // step 0: init, start, step, end
        let step0 = stepper.replicate().get_patch_by_key("p1", 0).unwrap();
        assert_eq!(step0.get_attribute_value("a").and_then(Value::as_int), Some(1));
        assert_eq!(step0.get_attribute_value("b").and_then(Value::as_int), Some(2));

        stepper.perform().unwrap(); // step 1
        let step1 = stepper.replicate().get_patch_by_key("p1", 0).unwrap();
        assert_eq!(step1.get_attribute_value("a").and_then(Value::as_int), Some(2));
        assert_eq!(step1.get_attribute_value("b").and_then(Value::as_int), Some(4));

        stepper.perform().unwrap(); // step 2
        let step2 = stepper.replicate().get_patch_by_key("p1", 0).unwrap();
        assert_eq!(step2.get_attribute_value("a").and_then(Value::as_int), Some(3));
        assert_eq!(step2.get_attribute_value("b").and_then(Value::as_int), Some(6));
    }

    fn dummy_ctx<'a>() -> crate::value::OpContext<'a> {
        // Tests only exercise dimensionless arithmetic, so a converter with
        // no registered edges and a throwaway rng are sufficient; both are
        // leaked to satisfy `OpContext`'s borrowed-reference shape inside a
        // closure that must be `'static` to satisfy `CompiledCallable`.
        let converter: &'static crate::convert::UnitConverter = Box::leak(Box::new(crate::convert::UnitConverter::new()));
        let rng: &'static mut rand_chacha::ChaCha8Rng = Box::leak(Box::new(<rand_chacha::ChaCha8Rng as rand::SeedableRng>::seed_from_u64(0)));
        crate::value::OpContext { converter, favor_big_decimal: false, rng }
    }

    struct SharedExporter(Rc<RefCell<RecordingExporter>>);

    impl crate::external::Exporter for SharedExporter {
        fn export(&mut self, step: u64, snapshot: &Snapshot, variables: &[String]) -> Result<(), EngineError> {
            self.0.borrow_mut().export(step, snapshot, variables)
        }
    }

    #[test]
    fn exporters_are_notified_after_each_committed_step() {
        let patch = Entity::new("Patch", 1, vec![]);
        let mut stepper = SimulationStepper::new(meta_shadow());
        stepper.register_patch("p1", Rc::new(RefCell::new(ShadowEntity::new(patch))));
        stepper.set_export_variables(vec!["a".to_owned()]);

        let recorder = Rc::new(RefCell::new(RecordingExporter::new()));
        stepper.register_exporter(Box::new(SharedExporter(recorder.clone())));

        stepper.perform().unwrap();
        stepper.perform().unwrap();

        let calls = &recorder.borrow().calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, 0);
        assert_eq!(calls[1].0, 1);
        assert_eq!(calls[0].1, vec!["a".to_owned()]);
    }

    #[test]
    fn handler_error_rolls_back_and_emits_no_snapshot() {
        let mut patch = Entity::new("Patch", 1, vec!["a".to_owned()]);
        patch.set_attribute_value("a", Value::int(1)).unwrap();
        patch.register_handlers(
            "a",
            Phase::Start,
            HandlerGroup::new(vec![HandlerPair::new(
                None,
                CompiledCallable::new(|_| Err(EngineError::IllegalSubstepState { reason: "boom".to_owned() })),
            )]),
        );
        let mut stepper = SimulationStepper::new(meta_shadow());
        stepper.register_patch("p1", Rc::new(RefCell::new(ShadowEntity::new(patch))));

        assert!(stepper.perform().is_err());
        assert_eq!(stepper.replicate().step_count(), 0);
    }

    #[test]
    fn organism_discovery_tracks_patch_attribute_after_end_phase() {
        let mut organism = Entity::new("Tree", 42, vec![]);
        organism.register_base_handlers("noop", HandlerGroup::empty());
        let organism_shadow = Rc::new(RefCell::new(ShadowEntity::new(organism)));

        let mut patch = Entity::new("Patch", 1, vec!["trees".to_owned()]);
        let entity_ref = Value::scalar(
            Scalar::EntityRef(EntityRef { type_name: "Tree".to_owned(), id: 42, mutable: true }),
            Units::atom("Tree"),
        );
        patch
            .set_attribute_value("trees", Value::distribution(Distribution::realized(vec![entity_ref.as_scalar().unwrap().clone()]).unwrap(), Units::empty()))
            .unwrap();

        let mut stepper = SimulationStepper::new(meta_shadow());
        stepper.register_patch("p1", Rc::new(RefCell::new(ShadowEntity::new(patch))));
        stepper.register_organism("p1", 42, organism_shadow);

        stepper.perform().unwrap();
        assert_eq!(stepper.organisms.get("p1").unwrap(), &vec![42]);
    }
}
