#![doc = include_str!("../README.md")]

mod callable;
mod cast;
mod convert;
mod decimal;
mod distribution;
mod entity;
mod error;
mod external;
mod intern;
mod program;
mod replicate;
mod resource;
mod shadow;
mod stepper;
mod units;
mod value;

pub use crate::{
    callable::{CompiledCallable, HandlerGroup, HandlerPair, Scope, Selector},
    cast::{cast_pair, KindClass},
    convert::{ConversionFn, UnitConverter},
    decimal::{Decimal, DECIMAL128_PRECISION},
    distribution::{Distribution, Moments, Sampler, VirtualDistribution},
    entity::{Entity, FrozenEntity},
    error::{EngineError, EngineResult, ErrorContext, Phase},
    external::{
        ConfigAdapter, ExportTarget, Exporter, ExternalDataAdapter, MapConfigAdapter, MapExternalDataAdapter,
        RecordingExporter, CONFIG_SUFFIX, EXTERNAL_DATA_SUFFIX,
    },
    intern::Interner,
    program::{EntityPrototype, Program},
    replicate::{GeometryToken, Query, QueryCache, Replicate, Snapshot},
    resource::{DepthGuard, RecursionTracker, DEFAULT_MAX_DEPTH},
    shadow::{ShadowEntity, ShadowHandle},
    stepper::SimulationStepper,
    units::Units,
    value::{EntityRef, LanguageType, OpContext, RootKind, Scalar, Value},
};
