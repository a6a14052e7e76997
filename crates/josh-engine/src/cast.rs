//! Value caster.
//!
//! Given an ordered operand pair, chooses a common kind class for both sides.
//! Promotion lattice (lowest to highest, numerics only): `int < decimal <
//! double`. `boolean` promotes to `int` only when a numeric context demands
//! it (arithmetic, never comparison-for-equality). Strings and entity-refs
//! never promote silently — mixing them with anything else is an
//! unsupported-op error raised by the caller.

use crate::{
    decimal::Decimal,
    error::{EngineError, ErrorContext},
    value::Scalar,
};

/// Where in the promotion lattice a scalar sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KindClass {
    Int,
    Decimal,
    Double,
}

impl KindClass {
    fn of(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Int(_) | Scalar::Boolean(_) => Some(Self::Int),
            Scalar::Decimal(_) => Some(Self::Decimal),
            Scalar::Double(_) => Some(Self::Double),
            Scalar::Str(_) | Scalar::EntityRef(_) => None,
        }
    }
}

/// Casts a single scalar up to the requested kind class. Never casts down.
fn cast_to(scalar: &Scalar, target: KindClass) -> Scalar {
    match (scalar, target) {
        (Scalar::Boolean(b), KindClass::Int) => Scalar::Int(i64::from(*b)),
        (Scalar::Int(_) | Scalar::Boolean(_), KindClass::Int) => scalar.clone(),
        (Scalar::Boolean(b), KindClass::Decimal) => Scalar::Decimal(Decimal::from_i64(i64::from(*b))),
        (Scalar::Int(i), KindClass::Decimal) => Scalar::Decimal(Decimal::from_i64(*i)),
        (Scalar::Decimal(_), KindClass::Decimal) => scalar.clone(),
        (Scalar::Boolean(b), KindClass::Double) => Scalar::Double(f64::from(*b)),
        (Scalar::Int(i), KindClass::Double) => Scalar::Double(*i as f64),
        (Scalar::Decimal(d), KindClass::Double) => Scalar::Double(d.to_f64()),
        (Scalar::Double(_), KindClass::Double) => scalar.clone(),
        _ => scalar.clone(),
    }
}

/// Aligns a pair of scalars to a common kind class, per the promotion lattice.
///
/// # Errors
/// Returns `UnsupportedOp` if either side is a string or entity-ref — those
/// never promote silently.
pub fn cast_pair(op: &'static str, a: &Scalar, b: &Scalar) -> Result<(Scalar, Scalar), EngineError> {
    let (Some(ka), Some(kb)) = (KindClass::of(a), KindClass::of(b)) else {
        let kind = if KindClass::of(a).is_none() { a.kind_name() } else { b.kind_name() };
        return Err(EngineError::UnsupportedOp { op, kind, context: ErrorContext::new() });
    };
    let target = ka.max(kb);
    Ok((cast_to(a, target), cast_to(b, target)))
}
