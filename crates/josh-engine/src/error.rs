//! Engine error taxonomy.
//!
//! Every engine failure mode maps to one [`EngineError`] variant. Each
//! variant that can be attributed to a specific
//! entity/attribute/phase carries that context so hosts can render a
//! structured report without re-deriving it from a stack trace.

use std::fmt;

use crate::units::Units;

/// Where in the step lifecycle an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Start,
    Step,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Step => "step",
            Self::End => "end",
        };
        f.write_str(s)
    }
}

/// Context attached to an error: which entity, which attribute, in which phase.
///
/// All fields are optional because not every error kind is raised from inside
/// substep resolution (e.g. a units-monoid violation discovered outside a step).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub entity: Option<String>,
    pub attribute: Option<String>,
    pub phase: Option<Phase>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(entity) = &self.entity {
            write!(f, "entity={entity}")?;
            wrote = true;
        }
        if let Some(attribute) = &self.attribute {
            write!(f, "{}attribute={attribute}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if let Some(phase) = &self.phase {
            write!(f, "{}phase={phase}", if wrote { ", " } else { "" })?;
        }
        Ok(())
    }
}

/// The full error kind taxonomy, one variant each.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unit mismatch: cannot combine {left} with {right} ({context})")]
    UnitMismatch {
        left: Units,
        right: Units,
        context: ErrorContext,
    },

    #[error("no registered conversion from {from} to {to}")]
    NoConversion { from: Units, to: Units },

    #[error("unsupported operation {op} for operand kind {kind} ({context})")]
    UnsupportedOp {
        op: &'static str,
        kind: &'static str,
        context: ErrorContext,
    },

    #[error("operation on empty realized distribution ({context})")]
    EmptyDistribution { context: ErrorContext },

    #[error("distribution size mismatch: {left} vs {right} ({context})")]
    SizeMismatch {
        left: String,
        right: String,
        context: ErrorContext,
    },

    #[error("bad exponent: {reason} ({context})")]
    BadExponent { reason: String, context: ErrorContext },

    #[error("unknown attribute '{attribute}' on entity '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("unknown simulation entity '{name}'")]
    UnknownSimulation { name: String },

    #[error("circular dependency resolving attribute '{attribute}' on entity '{entity}' ({context})")]
    CircularDependency {
        entity: String,
        attribute: String,
        context: ErrorContext,
    },

    #[error("illegal substep state transition: {reason}")]
    IllegalSubstepState { reason: String },

    #[error("handler for attribute '{attribute}' in phase {phase} raised: {source}")]
    HandlerError {
        attribute: String,
        phase: Phase,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Best-effort structured context, used by hosts to render a report without
    /// pattern-matching every variant themselves.
    #[must_use]
    pub fn context(&self) -> ErrorContext {
        match self {
            Self::UnitMismatch { context, .. }
            | Self::UnsupportedOp { context, .. }
            | Self::EmptyDistribution { context }
            | Self::SizeMismatch { context, .. }
            | Self::BadExponent { context, .. }
            | Self::CircularDependency { context, .. } => context.clone(),
            Self::UnknownAttribute { entity, attribute } => {
                ErrorContext::new().with_entity(entity.clone()).with_attribute(attribute.clone())
            }
            Self::HandlerError { attribute, phase, .. } => {
                ErrorContext::new().with_attribute(attribute.clone()).with_phase(*phase)
            }
            Self::NoConversion { .. } | Self::UnknownSimulation { .. } | Self::IllegalSubstepState { .. } => {
                ErrorContext::new()
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
