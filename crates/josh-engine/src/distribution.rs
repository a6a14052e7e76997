//! Distribution variant of [`crate::value::Value`].
//!
//! `Distribution` is a tagged enum rather than a polymorphic class hierarchy:
//! `Realized` holds a finite non-empty ordered sequence of scalars, `Virtual`
//! holds a sampler plus optional closed-form moments and no listable
//! elements.

use std::{fmt, sync::Arc};

use rand::RngCore;

use crate::{
    error::{EngineError, ErrorContext},
    value::Scalar,
};

/// Closed-form moments a virtual distribution may expose without sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

/// A parametric sampler for a virtual distribution. Boxed behind `Arc` so
/// `Distribution` stays cheap to clone, since values are always immutable.
pub type Sampler = Arc<dyn Fn(&mut dyn RngCore) -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct VirtualDistribution {
    sampler: Sampler,
    moments: Option<Moments>,
}

impl fmt::Debug for VirtualDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDistribution").field("moments", &self.moments).finish_non_exhaustive()
    }
}

impl VirtualDistribution {
    pub fn new(sampler: Sampler, moments: Option<Moments>) -> Self {
        Self { sampler, moments }
    }

    pub fn moments(&self) -> Option<Moments> {
        self.moments
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        (self.sampler)(rng)
    }

    /// Draws `n` realized samples in the documented traversal order: one
    /// draw per element, left to right, from the caller's seeded rng.
    pub fn realize(&self, n: usize, rng: &mut dyn RngCore) -> Vec<Scalar> {
        (0..n).map(|_| Scalar::Double(self.sample(rng))).collect()
    }
}

/// Either a finite realized sequence or a parametric virtual distribution.
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Non-empty ordered sequence; construction fails fast on empty input.
    Realized(Vec<Scalar>),
    Virtual(VirtualDistribution),
}

impl Distribution {
    /// Constructs a realized distribution. A realized distribution is never
    /// empty — construction rejects an empty input rather than allowing one.
    pub fn realized(values: Vec<Scalar>) -> Result<Self, EngineError> {
        if values.is_empty() {
            return Err(EngineError::EmptyDistribution { context: ErrorContext::new() });
        }
        Ok(Self::Realized(values))
    }

    pub fn virtual_dist(sampler: Sampler, moments: Option<Moments>) -> Self {
        Self::Virtual(VirtualDistribution::new(sampler, moments))
    }

    /// `getSize()`: known cardinality for realized, `None` (unknown) for virtual.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Realized(values) => Some(values.len()),
            Self::Virtual(_) => None,
        }
    }

    /// `freeze()`: materializes a virtual distribution to `size` elements using
    /// the given rng, or returns the realized elements unchanged.
    pub fn freeze(&self, size_hint: Option<usize>, rng: &mut dyn RngCore) -> Result<Vec<Scalar>, EngineError> {
        match self {
            Self::Realized(values) => Ok(values.clone()),
            Self::Virtual(v) => {
                let Some(n) = size_hint else {
                    return Err(EngineError::SizeMismatch {
                        left: "virtual".to_owned(),
                        right: "virtual".to_owned(),
                        context: ErrorContext::new(),
                    });
                };
                Ok(v.realize(n, rng))
            }
        }
    }

    pub fn as_realized(&self) -> Option<&[Scalar]> {
        match self {
            Self::Realized(values) => Some(values),
            Self::Virtual(_) => None,
        }
    }

    /// Elementwise reductions over a realized distribution.
    /// Mean/min/max/sum fold sequentially and deterministically; std uses the
    /// `n-1` (sample) denominator.
    pub fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    pub fn sum(values: &[f64]) -> f64 {
        values.iter().sum()
    }

    pub fn min(values: &[f64]) -> f64 {
        values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(values: &[f64]) -> f64 {
        values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn std(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let mean = Self::mean(values);
        let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        (sum_sq / (values.len() - 1) as f64).sqrt()
    }
}
