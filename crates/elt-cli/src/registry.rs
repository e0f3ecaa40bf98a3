//! The connector registry (§9 "Plugin-style connectors"): a tagged table
//! of capability functions built once at process start, not a runtime
//! class lookup keyed on strings. This binary only resolves *subprocess*
//! connectors from the table — in-process `LibrarySource`s are for Rust
//! programs embedding `elt-orchestrator` directly (see its tests), since a
//! generic CLI has no compiled-in knowledge of any specific source.

use anyhow::{Context, Result};
use elt_connectors::{Connector, SubprocessConnector};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// `connector_id -> executable path`, loaded from a small JSON file so an
/// operator can add a connector without recompiling this binary.
#[derive(Default)]
pub struct ConnectorRegistry {
    executables: HashMap<String, PathBuf>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ConnectorRegistry {
    pub fn new(working_dir: PathBuf, timeout: Duration) -> Self {
        ConnectorRegistry { executables: HashMap::new(), working_dir, timeout }
    }

    /// Loads `{"connector_id": "/path/to/executable", ...}` from `path`.
    /// Missing file is not an error — an empty registry just means every
    /// `resolve` call fails until entries are registered.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let bytes = std::fs::read(path).with_context(|| format!("read connector registry {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_slice(&bytes).with_context(|| format!("parse connector registry {}", path.display()))?;
        for (id, executable) in entries {
            self.register(id, executable);
        }
        Ok(())
    }

    pub fn register(&mut self, connector_id: impl Into<String>, executable: impl Into<PathBuf>) {
        self.executables.insert(connector_id.into(), executable.into());
    }

    pub fn resolve(&self, connector_id: &str) -> Result<Arc<dyn Connector>> {
        let executable = self
            .executables
            .get(connector_id)
            .with_context(|| format!("no connector registered for id '{connector_id}'"))?;
        Ok(Arc::new(
            SubprocessConnector::new(connector_id, executable.clone(), self.working_dir.clone()).with_timeout(self.timeout),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_registered_connector() {
        let mut registry = ConnectorRegistry::new(PathBuf::from("/tmp"), Duration::from_secs(1));
        registry.register("postgres", "/usr/local/bin/source-postgres");
        assert!(registry.resolve("postgres").is_ok());
    }

    #[test]
    fn unregistered_connector_is_an_error() {
        let registry = ConnectorRegistry::new(PathBuf::from("/tmp"), Duration::from_secs(1));
        assert!(registry.resolve("unknown").is_err());
    }

    #[test]
    fn missing_registry_file_is_not_an_error() {
        let mut registry = ConnectorRegistry::new(PathBuf::from("/tmp"), Duration::from_secs(1));
        assert!(registry.load_file(Path::new("/nonexistent/registry.json")).is_ok());
    }
}
