//! Units algebra.
//!
//! A unit expression is an ordered multiset of named factors, each carrying
//! an integer exponent. `multiply`/`divide`/`invert`/`raise_to_power` operate
//! on the canonical (sorted, zero-exponent-free) form so that equal units
//! always compare and hash equal, satisfying the usual monoid laws.

use std::{
    collections::BTreeMap,
    fmt::{self, Write as _},
};

/// Canonical unit expression: factor name -> nonzero integer exponent.
///
/// Stored as a sorted `Vec` rather than a `BTreeMap` so that `Units` stays
/// cheap to clone and hash; canonicalization happens once, at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Units(Vec<(String, i32)>);

impl Units {
    /// The dimensionless unit — the monoid identity.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Builds a unit from raw `(name, exponent)` factors, canonicalizing:
    /// duplicate names are summed, zero-exponent factors are dropped, and
    /// the result is sorted by name.
    pub fn from_factors(factors: impl IntoIterator<Item = (impl Into<String>, i32)>) -> Self {
        let mut map: BTreeMap<String, i32> = BTreeMap::new();
        for (name, exp) in factors {
            *map.entry(name.into()).or_insert(0) += exp;
        }
        map.retain(|_, exp| *exp != 0);
        Self(map.into_iter().collect())
    }

    /// A single named unit raised to the first power, e.g. `Units::atom("meter")`.
    pub fn atom(name: impl Into<String>) -> Self {
        Self::from_factors([(name, 1)])
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.is_empty()
    }

    /// True when a unit is dimensionless or the single `count` unit, the only
    /// units allowed to appear as an exponent.
    pub fn can_be_exponent(&self) -> bool {
        self.is_dimensionless() || (self.0.len() == 1 && self.0[0] == ("count".to_owned(), 1))
    }

    pub fn multiply(&self, other: &Self) -> Self {
        Self::from_factors(self.0.iter().cloned().chain(other.0.iter().cloned()))
    }

    pub fn divide(&self, other: &Self) -> Self {
        Self::from_factors(self.0.iter().cloned().chain(other.0.iter().map(|(n, e)| (n.clone(), -e))))
    }

    pub fn invert(&self) -> Self {
        Self::from_factors(self.0.iter().map(|(n, e)| (n.clone(), -e)))
    }

    /// `raiseToPower(n)`: multiplies every exponent by `n`. `n = 0` yields `EMPTY`.
    pub fn raise_to_power(&self, n: i32) -> Self {
        if n == 0 {
            return Self::empty();
        }
        Self::from_factors(self.0.iter().map(|(name, e)| (name.clone(), e * n)))
    }

    pub fn factors(&self) -> &[(String, i32)] {
        &self.0
    }
}

impl Default for Units {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("1");
        }
        let mut first = true;
        for (name, exp) in &self.0 {
            if !first {
                f.write_char('*')?;
            }
            first = false;
            if *exp == 1 {
                f.write_str(name)?;
            } else {
                write!(f, "{name}^{exp}")?;
            }
        }
        Ok(())
    }
}
