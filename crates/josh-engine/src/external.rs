//! External boundary adapters.
//!
//! These traits are the seams through which host-provided collaborators —
//! external data grids, config files, exporters — are reached. The core
//! appends a fixed file-type suffix itself so hosts only register the bare
//! resource name. One trait per collaborator, one in-memory default
//! implementation usable from tests.

use ahash::AHashMap;

use crate::{error::EngineError, replicate::Snapshot, value::Value};

/// Suffix the core appends before consulting an [`ExternalDataAdapter`].
pub const EXTERNAL_DATA_SUFFIX: &str = ".jshd";

/// Suffix the core appends before consulting a [`ConfigAdapter`].
pub const CONFIG_SUFFIX: &str = ".jshc";

/// Resolves a named external resource at a spatial key and step.
///
/// Implementations back this with whatever a host wants — raster files,
/// object storage, a remote service. The core only ever calls
/// [`ExternalDataAdapter::get_external`]; it never does I/O itself.
pub trait ExternalDataAdapter {
    /// Resolves `resource_name` (without suffix) at `geo_key` and `step`.
    ///
    /// # Errors
    /// Implementations may return any [`EngineError`]; `UnknownAttribute` is
    /// conventional for "resource not found".
    fn get_external(&self, geo_key: &str, resource_name: &str, step: i64) -> Result<Value, EngineError>;
}

/// In-memory [`ExternalDataAdapter`] keyed by `(geo_key, resource_name, step)`,
/// used by tests and as a reference implementation for hosts wiring a real one.
#[derive(Debug, Default)]
pub struct MapExternalDataAdapter {
    values: AHashMap<(String, String, i64), Value>,
}

impl MapExternalDataAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(mut self, geo_key: impl Into<String>, resource_name: impl Into<String>, step: i64, value: Value) -> Self {
        self.values.insert((geo_key.into(), resource_name.into(), step), value);
        self
    }
}

impl ExternalDataAdapter for MapExternalDataAdapter {
    fn get_external(&self, geo_key: &str, resource_name: &str, step: i64) -> Result<Value, EngineError> {
        self.values
            .get(&(geo_key.to_owned(), resource_name.to_owned(), step))
            .cloned()
            .ok_or_else(|| EngineError::UnknownAttribute { entity: geo_key.to_owned(), attribute: format!("{resource_name}{EXTERNAL_DATA_SUFFIX}") })
    }
}

/// Config lookup by name: `getConfig(name) -> Optional<Value>`. Absence is
/// not an error — callers decide whether a missing config entry is fatal.
pub trait ConfigAdapter {
    fn get_config(&self, name: &str) -> Option<Value>;
}

/// In-memory [`ConfigAdapter`], used by tests.
#[derive(Debug, Default)]
pub struct MapConfigAdapter {
    values: AHashMap<String, Value>,
}

impl MapConfigAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

impl ConfigAdapter for MapConfigAdapter {
    fn get_config(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

/// Invoked by the stepper after every step with the frozen snapshot and the
/// variable list to emit, in deterministic order.
pub trait Exporter {
    fn export(&mut self, step: u64, snapshot: &Snapshot, variables: &[String]) -> Result<(), EngineError>;
}

/// Emission strategy an [`Exporter`] chooses between: one consolidated file
/// for the whole run, or a templated path expanded per replicate/step/variable.
#[derive(Debug, Clone)]
pub enum ExportTarget {
    Consolidated { path: String },
    Parameterized { path_template: String },
}

impl ExportTarget {
    /// Expands `{replicate}/{step}/{variable}` tokens in a parameterized
    /// template; a no-op on a consolidated target.
    #[must_use]
    pub fn resolve_path(&self, replicate: &str, step: u64, variable: &str) -> String {
        match self {
            Self::Consolidated { path } => path.clone(),
            Self::Parameterized { path_template } => path_template
                .replace("{replicate}", replicate)
                .replace("{step}", &step.to_string())
                .replace("{variable}", variable),
        }
    }
}

/// Collects `(step, variables)` pairs in memory, used by tests to assert the
/// stepper notified exporters in deterministic order.
#[derive(Debug, Default)]
pub struct RecordingExporter {
    pub calls: Vec<(u64, Vec<String>)>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Exporter for RecordingExporter {
    fn export(&mut self, step: u64, _snapshot: &Snapshot, variables: &[String]) -> Result<(), EngineError> {
        self.calls.push((step, variables.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_external_adapter_resolves_registered_value() {
        let adapter = MapExternalDataAdapter::new().with_value("p1", "elevation", 0, Value::int(42));
        let result = adapter.get_external("p1", "elevation", 0).unwrap();
        assert_eq!(result.as_int(), Some(42));
    }

    #[test]
    fn map_external_adapter_errors_on_missing_resource() {
        let adapter = MapExternalDataAdapter::new();
        assert!(adapter.get_external("p1", "elevation", 0).is_err());
    }

    #[test]
    fn map_config_adapter_returns_none_for_missing_name() {
        let adapter = MapConfigAdapter::new();
        assert!(adapter.get_config("resolution").is_none());
    }

    #[test]
    fn parameterized_target_expands_tokens() {
        let target = ExportTarget::Parameterized { path_template: "out/{replicate}/{step}/{variable}.csv".to_owned() };
        assert_eq!(target.resolve_path("r0", 3, "height"), "out/r0/3/height.csv");
    }

    #[test]
    fn recording_exporter_tracks_calls_in_order() {
        let mut exporter = RecordingExporter::new();
        let snapshot = Snapshot::new();
        exporter.export(0, &snapshot, &["a".to_owned()]).unwrap();
        exporter.export(1, &snapshot, &["a".to_owned(), "b".to_owned()]).unwrap();
        assert_eq!(exporter.calls.len(), 2);
        assert_eq!(exporter.calls[0].0, 0);
        assert_eq!(exporter.calls[1].1, vec!["a".to_owned(), "b".to_owned()]);
    }
}
