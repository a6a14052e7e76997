//! Typed values — the core arithmetic subsystem.
//!
//! `Value` is a tagged union over scalars and distributions, always carrying
//! a [`Units`] and a [`LanguageType`] descriptor. Arithmetic is a single
//! `apply(op, a, b)` entry point: one coerce-then-match pipeline rather than
//! a double-dispatch table keyed by both operand kinds.

use std::fmt;

use rand::RngCore;

use crate::{
    cast::cast_pair,
    convert::{ConversionFn, UnitConverter},
    decimal::Decimal,
    distribution::Distribution,
    error::{EngineError, ErrorContext},
    units::Units,
};

/// An immutable or mutable reference to an entity. Entity-ref values
/// synthesize their units from the entity's type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub type_name: String,
    pub id: u64,
    pub mutable: bool,
}

/// Scalar payload of a `Value`: the non-distribution half of the sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Decimal(Decimal),
    Double(f64),
    Boolean(bool),
    Str(String),
    EntityRef(EntityRef),
}

impl Scalar {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Decimal(_) => "decimal",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Str(_) => "string",
            Self::EntityRef(_) => "entity-ref",
        }
    }

    fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Decimal(d) => Some(d.to_f64()),
            Self::Double(d) => Some(*d),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Str(_) | Self::EntityRef(_) => None,
        }
    }
}

/// Root kind of a [`LanguageType`] — the primitive family before any
/// distribution wrapping is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootKind {
    Int,
    Decimal,
    Double,
    Boolean,
    String,
    Entity(String),
}

/// A root kind plus an ordered count of distribution wrappers and a
/// "contains-attributes" flag, used by the evaluator for dispatch.
///
/// Two language types are equal iff their serialized (`Display`) forms
/// match; `Eq`/`Hash` here derive structurally, which is equivalent since
/// every field participates in the serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageType {
    pub root: RootKind,
    pub distribution_depth: u32,
    pub contains_attributes: bool,
}

impl LanguageType {
    pub fn scalar(root: RootKind) -> Self {
        let contains_attributes = matches!(root, RootKind::Entity(_));
        Self { root, distribution_depth: 0, contains_attributes }
    }

    #[must_use]
    pub fn wrap_distribution(mut self) -> Self {
        self.distribution_depth += 1;
        self
    }
}

impl fmt::Display for LanguageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = match &self.root {
            RootKind::Int => "int".to_owned(),
            RootKind::Decimal => "decimal".to_owned(),
            RootKind::Double => "double".to_owned(),
            RootKind::Boolean => "boolean".to_owned(),
            RootKind::String => "string".to_owned(),
            RootKind::Entity(name) => name.clone(),
        };
        for _ in 0..self.distribution_depth {
            write!(f, "Distribution<")?;
        }
        write!(f, "{root}")?;
        for _ in 0..self.distribution_depth {
            write!(f, ">")?;
        }
        Ok(())
    }
}

/// Scalar or distribution payload, always paired with [`Units`].
#[derive(Debug, Clone)]
enum Data {
    Scalar(Scalar),
    Distribution(Distribution),
}

/// Primary typed value: a tagged union over scalars and distributions,
/// always carrying units and a language-type descriptor.
#[derive(Debug, Clone)]
pub struct Value {
    data: Data,
    units: Units,
}

/// Execution context threaded through binary operations: the unit converter
/// to use for add/sub/compare coercion, the decimal-favoring division mode,
/// and the rng virtual distributions sample from.
pub struct OpContext<'a> {
    pub converter: &'a UnitConverter,
    pub favor_big_decimal: bool,
    pub rng: &'a mut dyn RngCore,
}

impl Value {
    pub fn scalar(scalar: Scalar, units: Units) -> Self {
        Self { data: Data::Scalar(scalar), units }
    }

    pub fn distribution(dist: Distribution, units: Units) -> Self {
        Self { data: Data::Distribution(dist), units }
    }

    pub fn int(v: i64) -> Self {
        Self::scalar(Scalar::Int(v), Units::empty())
    }

    pub fn double(v: f64) -> Self {
        Self::scalar(Scalar::Double(v), Units::empty())
    }

    pub fn boolean(v: bool) -> Self {
        Self::scalar(Scalar::Boolean(v), Units::empty())
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::scalar(Scalar::Str(v.into()), Units::empty())
    }

    pub fn units(&self) -> &Units {
        &self.units
    }

    pub fn language_type(&self) -> LanguageType {
        let root = match &self.data {
            Data::Scalar(s) => root_kind_of(s),
            Data::Distribution(Distribution::Realized(values)) => {
                values.first().map(root_kind_of).unwrap_or(RootKind::Double)
            }
            Data::Distribution(Distribution::Virtual(_)) => RootKind::Double,
        };
        let base = LanguageType::scalar(root);
        match &self.data {
            Data::Scalar(_) => base,
            Data::Distribution(_) => base.wrap_distribution(),
        }
    }

    /// `replaceUnits`: identity on inner data, new unit label.
    #[must_use]
    pub fn replace_units(&self, new_units: Units) -> Self {
        Self { data: self.data.clone(), units: new_units }
    }

    /// `getSize()`: 1 for scalar, known cardinality for realized, `None` for virtual.
    pub fn get_size(&self) -> Option<usize> {
        match &self.data {
            Data::Scalar(_) => Some(1),
            Data::Distribution(d) => d.size(),
        }
    }

    /// Snapshots distribution contents if needed; scalars are already immutable.
    pub fn freeze(&self, rng: &mut dyn RngCore) -> Result<Self, EngineError> {
        match &self.data {
            Data::Scalar(_) => Ok(self.clone()),
            Data::Distribution(d) => {
                let values = d.freeze(d.size(), rng)?;
                Ok(Self::distribution(Distribution::Realized(values), self.units.clone()))
            }
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.data {
            Data::Scalar(s) => Some(s),
            Data::Distribution(_) => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&Distribution> {
        match &self.data {
            Data::Scalar(_) => None,
            Data::Distribution(d) => Some(d),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.as_scalar()? {
            Scalar::Int(i) => Some(*i),
            Scalar::Boolean(b) => Some(i64::from(*b)),
            Scalar::Decimal(d) => d.to_i64(),
            Scalar::Double(d) => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        self.as_scalar()?.to_f64()
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.as_scalar()? {
            Scalar::Decimal(d) => Some(d.clone()),
            Scalar::Int(i) => Some(Decimal::from_i64(*i)),
            Scalar::Boolean(b) => Some(Decimal::from_i64(i64::from(*b))),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.as_scalar()? {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self.as_scalar()? {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self.as_scalar()? {
            Scalar::EntityRef(e) => Some(e),
            _ => None,
        }
    }

    // -- Arithmetic -----------------------------------------------------

    pub fn add(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.binary(ArithOp::Add, other, ctx)
    }

    pub fn subtract(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.binary(ArithOp::Sub, other, ctx)
    }

    pub fn multiply(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.binary(ArithOp::Mul, other, ctx)
    }

    pub fn divide(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.binary(ArithOp::Div, other, ctx)
    }

    /// Exponentiation. `other`'s units must be dimensionless (or the `count`
    /// unit): the base may carry units only if the exponent is an integer.
    pub fn power(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        let exponent_units = other.units.clone();
        if !exponent_units.can_be_exponent() {
            return Err(EngineError::BadExponent {
                reason: format!("exponent units {exponent_units} are not dimensionless"),
                context: ErrorContext::new(),
            });
        }
        let Some(exponent) = other.as_double() else {
            return Err(EngineError::UnsupportedOp {
                op: "power",
                kind: other.as_scalar().map_or("distribution", Scalar::kind_name),
                context: ErrorContext::new(),
            });
        };
        let is_integer_exponent = exponent.fract() == 0.0;
        if !self.units.is_dimensionless() && !is_integer_exponent {
            return Err(EngineError::BadExponent {
                reason: "non-integer exponent against a dimensioned base".to_owned(),
                context: ErrorContext::new(),
            });
        }

        match &self.data {
            Data::Scalar(s) => {
                let result = scalar_pow(s, exponent, ctx.favor_big_decimal)?;
                let units = self.units.raise_to_power(exponent as i32);
                Ok(Self::scalar(result, units))
            }
            Data::Distribution(_) => {
                let elements = self.realize_elements_with_hint(self.get_size(), ctx.rng)?;
                let results: Result<Vec<_>, _> =
                    elements.iter().map(|s| scalar_pow(s, exponent, ctx.favor_big_decimal)).collect();
                let units = self.units.raise_to_power(exponent as i32);
                Ok(Self::distribution(Distribution::realized(results?)?, units))
            }
        }
    }

    fn binary(&self, op: ArithOp, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        let needs_unit_align = matches!(op, ArithOp::Add | ArithOp::Sub);
        let (result_units, align_fn) = if needs_unit_align {
            self.align_units(other, ctx.converter)?
        } else {
            (op.result_units(&self.units, &other.units), None)
        };

        match (&self.data, &other.data) {
            (Data::Scalar(a), Data::Scalar(b)) => {
                let b_adjusted = apply_align(b, align_fn.as_ref());
                let result = scalar_arith(op, a, &b_adjusted, ctx.favor_big_decimal)?;
                Ok(Self::scalar(result, result_units))
            }
            _ => {
                let hint = self.get_size().or_else(|| other.get_size());
                let left = self.realize_elements_with_hint(hint, ctx.rng)?;
                let right = other.realize_elements_with_hint(hint, ctx.rng)?;
                let (left, right) = broadcast(left, right)?;
                let results: Result<Vec<_>, _> = left
                    .iter()
                    .zip(right.iter())
                    .map(|(a, b)| {
                        let b_adjusted = apply_align(b, align_fn.as_ref());
                        scalar_arith(op, a, &b_adjusted, ctx.favor_big_decimal)
                    })
                    .collect();
                Ok(Self::distribution(Distribution::realized(results?)?, result_units))
            }
        }
    }

    /// For add/sub/compare: if units differ, finds a conversion for the
    /// right-hand side into the left-hand side's units. Returns the result
    /// units (the left side's) and the conversion itself, applied directly to
    /// right-hand scalars before the arithmetic — not approximated as a pure
    /// scale, since a registered `ConversionFn` may be affine (e.g. Celsius to
    /// Fahrenheit) rather than a ratio.
    fn align_units(&self, other: &Self, converter: &UnitConverter) -> Result<(Units, Option<ConversionFn>), EngineError> {
        if self.units == other.units {
            return Ok((self.units.clone(), None));
        }
        let convert = converter.get_conversion(&other.units, &self.units).map_err(|_| EngineError::UnitMismatch {
            left: self.units.clone(),
            right: other.units.clone(),
            context: ErrorContext::new(),
        })?;
        Ok((self.units.clone(), Some(convert)))
    }

    /// Materializes this value's elements, using `size_hint` to realize a
    /// virtual distribution when this value's own cardinality is unknown:
    /// virtual-vs-other uses the other operand's size, while virtual-vs-
    /// virtual has no size to borrow and raises `size-mismatch` here.
    fn realize_elements_with_hint(&self, size_hint: Option<usize>, rng: &mut dyn RngCore) -> Result<Vec<Scalar>, EngineError> {
        match &self.data {
            Data::Scalar(s) => Ok(vec![s.clone()]),
            Data::Distribution(d) => d.freeze(d.size().or(size_hint), rng),
        }
    }

    // -- Comparison -------------------------------------------------------

    pub fn gt(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.compare(other, ctx, |o| o == std::cmp::Ordering::Greater)
    }

    pub fn ge(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.compare(other, ctx, |o| o != std::cmp::Ordering::Less)
    }

    pub fn lt(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.compare(other, ctx, |o| o == std::cmp::Ordering::Less)
    }

    pub fn le(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.compare(other, ctx, |o| o != std::cmp::Ordering::Greater)
    }

    pub fn eq_value(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.compare(other, ctx, |o| o == std::cmp::Ordering::Equal)
    }

    pub fn ne_value(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.compare(other, ctx, |o| o != std::cmp::Ordering::Equal)
    }

    fn compare(
        &self,
        other: &Self,
        ctx: &mut OpContext,
        pred: impl Fn(std::cmp::Ordering) -> bool + Copy,
    ) -> Result<Self, EngineError> {
        let (_, align_fn) = self.align_units(other, ctx.converter)?;
        match (&self.data, &other.data) {
            (Data::Scalar(a), Data::Scalar(b)) => {
                let b_adjusted = apply_align(b, align_fn.as_ref());
                let ordering = scalar_cmp(a, &b_adjusted)?;
                Ok(Self::boolean(pred(ordering)))
            }
            _ => {
                let hint = self.get_size().or_else(|| other.get_size());
                let left = self.realize_elements_with_hint(hint, ctx.rng)?;
                let right = other.realize_elements_with_hint(hint, ctx.rng)?;
                let (left, right) = broadcast(left, right)?;
                let results: Result<Vec<_>, _> = left
                    .iter()
                    .zip(right.iter())
                    .map(|(a, b)| {
                        let b_adjusted = apply_align(b, align_fn.as_ref());
                        scalar_cmp(a, &b_adjusted).map(|o| Scalar::Boolean(pred(o)))
                    })
                    .collect();
                Ok(Self::distribution(Distribution::realized(results?)?, Units::empty()))
            }
        }
    }

    // -- Boolean logic -----------------------------------------------------

    pub fn and(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.logic(other, ctx, |a, b| a && b)
    }

    pub fn or(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.logic(other, ctx, |a, b| a || b)
    }

    pub fn xor(&self, other: &Self, ctx: &mut OpContext) -> Result<Self, EngineError> {
        self.logic(other, ctx, |a, b| a != b)
    }

    fn logic(&self, other: &Self, ctx: &mut OpContext, op: impl Fn(bool, bool) -> bool + Copy) -> Result<Self, EngineError> {
        match (&self.data, &other.data) {
            (Data::Scalar(a), Data::Scalar(b)) => {
                let (a, b) = (require_bool(a)?, require_bool(b)?);
                Ok(Self::boolean(op(a, b)))
            }
            _ => {
                let hint = self.get_size().or_else(|| other.get_size());
                let left = self.realize_elements_with_hint(hint, ctx.rng)?;
                let right = other.realize_elements_with_hint(hint, ctx.rng)?;
                let (left, right) = broadcast(left, right)?;
                let results: Result<Vec<_>, _> = left
                    .iter()
                    .zip(right.iter())
                    .map(|(a, b)| Ok(Scalar::Boolean(op(require_bool(a)?, require_bool(b)?))))
                    .collect();
                Ok(Self::distribution(Distribution::realized(results?)?, Units::empty()))
            }
        }
    }
}

fn require_bool(s: &Scalar) -> Result<bool, EngineError> {
    match s {
        Scalar::Boolean(b) => Ok(*b),
        _ => Err(EngineError::UnsupportedOp { op: "boolean-logic", kind: s.kind_name(), context: ErrorContext::new() }),
    }
}

fn root_kind_of(s: &Scalar) -> RootKind {
    match s {
        Scalar::Int(_) => RootKind::Int,
        Scalar::Decimal(_) => RootKind::Decimal,
        Scalar::Double(_) => RootKind::Double,
        Scalar::Boolean(_) => RootKind::Boolean,
        Scalar::Str(_) => RootKind::String,
        Scalar::EntityRef(e) => RootKind::Entity(e.type_name.clone()),
    }
}

/// Applies a unit conversion to a scalar before the kind-class arithmetic
/// runs, promoting it to `Double` if a conversion was supplied (conversions
/// are defined over floating magnitudes and may be affine, not just scale).
fn apply_align(s: &Scalar, convert: Option<&ConversionFn>) -> Scalar {
    match convert {
        None => s.clone(),
        Some(f) => Scalar::Double(f(s.to_f64().unwrap_or(f64::NAN))),
    }
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn result_units(self, left: &Units, right: &Units) -> Units {
        match self {
            Self::Add | Self::Sub => left.clone(),
            Self::Mul => left.multiply(right),
            Self::Div => {
                let divided = left.divide(right);
                // `count` is the one unit division is not allowed to cancel away: a
                // count divided by a count is still a count, not a bare ratio.
                let count = Units::atom("count");
                if divided.is_dimensionless() && *left == count && *right == count {
                    count
                } else {
                    divided
                }
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "subtract",
            Self::Mul => "multiply",
            Self::Div => "divide",
        }
    }
}

/// Broadcasts two realized element sequences to a common length: equal-length
/// realized pairs proceed elementwise; a 1-vs-N pairing broadcasts the scalar
/// across N; anything else is a size mismatch.
fn broadcast(left: Vec<Scalar>, right: Vec<Scalar>) -> Result<(Vec<Scalar>, Vec<Scalar>), EngineError> {
    match (left.len(), right.len()) {
        (l, r) if l == r => Ok((left, right)),
        (1, r) => Ok((std::iter::repeat(left[0].clone()).take(r).collect(), right)),
        (l, 1) => Ok((left, std::iter::repeat(right[0].clone()).take(l).collect())),
        (l, r) => Err(EngineError::SizeMismatch { left: l.to_string(), right: r.to_string(), context: ErrorContext::new() }),
    }
}

/// Scalar-level arithmetic in the promoted kind class.
fn scalar_arith(op: ArithOp, a: &Scalar, b: &Scalar, favor_big_decimal: bool) -> Result<Scalar, EngineError> {
    if let (Scalar::Str(x), Scalar::Str(y)) = (a, b) {
        return match op {
            ArithOp::Add => Ok(Scalar::Str(format!("{x}{y}"))),
            _ => Err(EngineError::UnsupportedOp { op: op.name(), kind: "string", context: ErrorContext::new() }),
        };
    }
    if matches!(a, Scalar::EntityRef(_)) || matches!(b, Scalar::EntityRef(_)) {
        return Err(EngineError::UnsupportedOp { op: op.name(), kind: "entity-ref", context: ErrorContext::new() });
    }

    let (a, b) = cast_pair(op.name(), a, b)?;
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => match op {
            ArithOp::Add => Ok(Scalar::Int(x + y)),
            ArithOp::Sub => Ok(Scalar::Int(x - y)),
            ArithOp::Mul => Ok(Scalar::Int(x * y)),
            ArithOp::Div => {
                if y == 0 {
                    return Err(EngineError::UnsupportedOp { op: "divide", kind: "int/zero", context: ErrorContext::new() });
                }
                if favor_big_decimal {
                    Ok(Scalar::Decimal(Decimal::from_i64(x).div(&Decimal::from_i64(y)).expect("nonzero divisor")))
                } else {
                    Ok(Scalar::Double(x as f64 / y as f64))
                }
            }
        },
        (Scalar::Decimal(x), Scalar::Decimal(y)) => match op {
            ArithOp::Add => Ok(Scalar::Decimal(x.add(&y))),
            ArithOp::Sub => Ok(Scalar::Decimal(x.sub(&y))),
            ArithOp::Mul => Ok(Scalar::Decimal(x.mul(&y))),
            ArithOp::Div => x
                .div(&y)
                .map(Scalar::Decimal)
                .ok_or(EngineError::UnsupportedOp { op: "divide", kind: "decimal/zero", context: ErrorContext::new() }),
        },
        (Scalar::Double(x), Scalar::Double(y)) => match op {
            ArithOp::Add => Ok(Scalar::Double(x + y)),
            ArithOp::Sub => Ok(Scalar::Double(x - y)),
            ArithOp::Mul => Ok(Scalar::Double(x * y)),
            ArithOp::Div => Ok(Scalar::Double(x / y)),
        },
        _ => unreachable!("cast_pair guarantees both operands share a kind class"),
    }
}

fn scalar_pow(base: &Scalar, exponent: f64, favor_big_decimal: bool) -> Result<Scalar, EngineError> {
    match base {
        Scalar::Int(x) if exponent.fract() == 0.0 && exponent >= 0.0 => {
            Ok(Scalar::Int(x.pow(exponent as u32)))
        }
        Scalar::Decimal(d) if exponent.fract() == 0.0 => {
            let mut acc = Decimal::from_i64(1);
            let n = exponent as i64;
            let (base_d, neg) = if n < 0 { (d.clone(), true) } else { (d.clone(), false) };
            for _ in 0..n.unsigned_abs() {
                acc = acc.mul(&base_d);
            }
            if neg {
                acc = Decimal::from_i64(1)
                    .div(&acc)
                    .ok_or(EngineError::UnsupportedOp { op: "power", kind: "decimal/zero", context: ErrorContext::new() })?;
            }
            Ok(Scalar::Decimal(acc))
        }
        _ => {
            let base_f = base.to_f64().ok_or(EngineError::UnsupportedOp {
                op: "power",
                kind: base.kind_name(),
                context: ErrorContext::new(),
            })?;
            let _ = favor_big_decimal;
            Ok(Scalar::Double(base_f.powf(exponent)))
        }
    }
}

fn scalar_cmp(a: &Scalar, b: &Scalar) -> Result<std::cmp::Ordering, EngineError> {
    if let (Scalar::Str(x), Scalar::Str(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    if let (Scalar::EntityRef(x), Scalar::EntityRef(y)) = (a, b) {
        return Ok(x.id.cmp(&y.id));
    }
    let (a, b) = cast_pair("compare", a, b)?;
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => Ok(x.cmp(&y)),
        (Scalar::Decimal(x), Scalar::Decimal(y)) => Ok(x.cmp(&y)),
        (Scalar::Double(x), Scalar::Double(y)) => {
            x.partial_cmp(&y).ok_or(EngineError::UnsupportedOp { op: "compare", kind: "double/nan", context: ErrorContext::new() })
        }
        _ => unreachable!("cast_pair guarantees both operands share a kind class"),
    }
}
