//! Unit converter.
//!
//! A directed graph of registered point-to-point conversions. `convert`
//! returns an identity conversion when `from == to`, otherwise composes a
//! shortest path of registered edges and memoizes the composition.

use std::{cell::RefCell, collections::HashMap, collections::VecDeque, sync::Arc};

use crate::{error::EngineError, units::Units};

/// A registered conversion function, e.g. feet -> meters.
pub type ConversionFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

#[derive(Default)]
pub struct UnitConverter {
    edges: HashMap<Units, Vec<(Units, ConversionFn)>>,
    // Memoized compositions, keyed by (from, to). RefCell because lookups
    // that find a new path need to write through a shared &self.
    memo: RefCell<HashMap<(Units, Units), ConversionFn>>,
}

impl UnitConverter {
    pub fn new() -> Self {
        Self { edges: HashMap::new(), memo: RefCell::new(HashMap::new()) }
    }

    /// Registers a direct conversion `from -> to`. Does not automatically
    /// register the inverse; register both directions explicitly if needed.
    pub fn register(&mut self, from: Units, to: Units, convert: ConversionFn) {
        self.edges.entry(from).or_default().push((to, convert));
    }

    /// Returns a function converting a raw numeric value from `from` units to
    /// `to` units. Identity if `from == to`; otherwise a shortest-path
    /// composition over registered edges, memoized after first lookup.
    ///
    /// # Errors
    /// `NoConversion` if `to` is unreachable from `from`.
    pub fn get_conversion(&self, from: &Units, to: &Units) -> Result<ConversionFn, EngineError> {
        if from == to {
            return Ok(Arc::new(|v| v));
        }
        if let Some(cached) = self.memo.borrow().get(&(from.clone(), to.clone())) {
            return Ok(cached.clone());
        }

        let path = self.shortest_path(from, to).ok_or_else(|| EngineError::NoConversion {
            from: from.clone(),
            to: to.clone(),
        })?;

        let composed: ConversionFn = Arc::new(move |v| path.iter().fold(v, |acc, step| step(acc)));
        self.memo.borrow_mut().insert((from.clone(), to.clone()), composed.clone());
        Ok(composed)
    }

    /// BFS over registered edges; returns the ordered list of edge functions
    /// along the shortest path, or `None` if unreachable.
    fn shortest_path(&self, from: &Units, to: &Units) -> Option<Vec<ConversionFn>> {
        let mut visited = std::collections::HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((from.clone(), Vec::<ConversionFn>::new()));
        visited.insert(from.clone());

        while let Some((current, path)) = queue.pop_front() {
            if &current == to {
                return Some(path);
            }
            if let Some(neighbors) = self.edges.get(&current) {
                for (next, f) in neighbors {
                    if visited.insert(next.clone()) {
                        let mut next_path = path.clone();
                        next_path.push(f.clone());
                        queue.push_back((next.clone(), next_path));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_units_equal() {
        let conv = UnitConverter::new();
        let m = Units::atom("meter");
        let f = conv.get_conversion(&m, &m).unwrap();
        assert_eq!(f(5.0), 5.0);
    }

    #[test]
    fn unreachable_units_error() {
        let conv = UnitConverter::new();
        let m = Units::atom("meter");
        let s = Units::atom("second");
        assert!(conv.get_conversion(&m, &s).is_err());
    }

    #[test]
    fn composes_shortest_path() {
        let mut conv = UnitConverter::new();
        let feet = Units::atom("feet");
        let meter = Units::atom("meter");
        let km = Units::atom("kilometer");
        conv.register(feet.clone(), meter.clone(), Arc::new(|v| v * 0.3048));
        conv.register(meter.clone(), km.clone(), Arc::new(|v| v / 1000.0));

        let direct = conv.get_conversion(&feet, &km).unwrap();
        assert!((direct(1000.0) - 0.3048).abs() < 1e-9);
    }

    #[test]
    fn memoizes_composition() {
        let mut conv = UnitConverter::new();
        let a = Units::atom("a");
        let b = Units::atom("b");
        conv.register(a.clone(), b.clone(), Arc::new(|v| v + 1.0));
        let _ = conv.get_conversion(&a, &b).unwrap();
        assert_eq!(conv.memo.borrow().len(), 1);
        let _ = conv.get_conversion(&a, &b).unwrap();
        assert_eq!(conv.memo.borrow().len(), 1);
    }
}
