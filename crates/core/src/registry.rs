//! Script discovery contract.
//!
//! The orchestrator only depends on [`ScriptRegistry`]. How scripts get
//! there (explicit registration, generated tables, plugin loading) is the
//! backend's concern. [`StaticScriptRegistry`] is the explicit-registration
//! backend.

use std::sync::Arc;

use crate::error::CoreError;
use crate::script::{describe_scripts, ScriptRef};

/// Source of the scripts available for migration.
pub trait ScriptRegistry<T>: Send + Sync {
    /// The unique Initial script, if one is registered.
    ///
    /// More than one registered Initial script is a configuration error.
    fn find_initial_script(&self) -> Result<Option<ScriptRef<T>>, CoreError>;

    /// All registered Upgrade scripts. Never contains the Initial script.
    fn find_all_scripts(&self) -> Vec<ScriptRef<T>>;

    /// The script registered for the exact `from_version` / `to_version` pair.
    ///
    /// Upgrade scripts are searched first, then the Initial script.
    fn find_script(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<Option<ScriptRef<T>>, CoreError> {
        let matches = |script: &ScriptRef<T>| {
            let info = script.info();
            info.from_version == from_version && info.to_version == to_version
        };
        if let Some(script) = self.find_all_scripts().into_iter().find(|s| matches(s)) {
            return Ok(Some(script));
        }
        Ok(self.find_initial_script()?.filter(|s| matches(s)))
    }
}

/// Registry holding explicitly registered scripts in registration order.
pub struct StaticScriptRegistry<T> {
    scripts: Vec<ScriptRef<T>>,
}

impl<T> Default for StaticScriptRegistry<T> {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
        }
    }
}

impl<T> StaticScriptRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script after validating its version metadata.
    pub fn register(&mut self, script: ScriptRef<T>) -> Result<&mut Self, CoreError> {
        script.info().check()?;
        tracing::debug!(script = %script.info(), "Migration script registered");
        self.scripts.push(script);
        Ok(self)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_script(mut self, script: ScriptRef<T>) -> Result<Self, CoreError> {
        self.register(script)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl<T> ScriptRegistry<T> for StaticScriptRegistry<T> {
    fn find_initial_script(&self) -> Result<Option<ScriptRef<T>>, CoreError> {
        let initials: Vec<&ScriptRef<T>> = self
            .scripts
            .iter()
            .filter(|s| s.info().is_initial())
            .collect();
        match initials.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(Arc::clone(only))),
            many => Err(CoreError::DuplicateInitialScript {
                count: many.len(),
                scripts: describe_scripts(many.iter().map(|s| s.info())),
            }),
        }
    }

    fn find_all_scripts(&self) -> Vec<ScriptRef<T>> {
        self.scripts
            .iter()
            .filter(|s| !s.info().is_initial())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
