//! Owned name → pulse map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::distributed::DistributedPulse;
use super::local::LocalPulse;
use super::store::SharedStore;
use super::Pulse;
use crate::error_handling::AttenuatorError;
use crate::metrics::{noop_sink, MetricsSink};

/// Registry of pulses, keyed by lower-cased name.
///
/// Lookups take the read lock. Creation checks for an existing name and inserts
/// under a single write-lock acquisition, so two concurrent creators of the same
/// name cannot both succeed.
pub struct PulseRegistry {
    pulses: RwLock<HashMap<String, Arc<dyn Pulse>>>,
    sink: Arc<dyn MetricsSink>,
}

impl PulseRegistry {
    /// Creates an empty registry reporting to `sink`.
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        PulseRegistry {
            pulses: RwLock::new(HashMap::new()),
            sink,
        }
    }

    /// Creates and registers an in-process pulse.
    ///
    /// # Errors
    ///
    /// Returns `PulseAlreadyExists` if the name is taken, otherwise any error
    /// from [`LocalPulse::new`].
    pub fn create_local(
        &self,
        name: &str,
        max_inflight: usize,
        max_hertz: f64,
    ) -> Result<Arc<dyn Pulse>, AttenuatorError> {
        self.insert_new(name, || {
            let pulse: Arc<dyn Pulse> = Arc::new(LocalPulse::new(
                name,
                max_inflight,
                max_hertz,
                Arc::clone(&self.sink),
            )?);
            Ok(pulse)
        })
    }

    /// Creates and registers a pulse on a shared store.
    ///
    /// # Errors
    ///
    /// Returns `PulseAlreadyExists` if the name is taken, otherwise any error
    /// from [`DistributedPulse::new`].
    pub fn create_distributed(
        &self,
        name: &str,
        max_inflight: usize,
        max_hertz: f64,
        store: Arc<dyn SharedStore>,
    ) -> Result<Arc<dyn Pulse>, AttenuatorError> {
        self.insert_new(name, || {
            let pulse: Arc<dyn Pulse> = Arc::new(DistributedPulse::new(
                name,
                max_inflight,
                max_hertz,
                store,
                Arc::clone(&self.sink),
            )?);
            Ok(pulse)
        })
    }

    /// Returns the pulse registered under `name`, creating a local one if there is none.
    pub fn get_or_create_local(
        &self,
        name: &str,
        max_inflight: usize,
        max_hertz: f64,
    ) -> Result<Arc<dyn Pulse>, AttenuatorError> {
        let mut pulses = self.pulses.write().unwrap_or_else(|e| e.into_inner());
        let key = name.to_lowercase();
        if let Some(existing) = pulses.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let pulse: Arc<dyn Pulse> = Arc::new(LocalPulse::new(
            name,
            max_inflight,
            max_hertz,
            Arc::clone(&self.sink),
        )?);
        pulses.insert(key, Arc::clone(&pulse));
        Ok(pulse)
    }

    fn insert_new<F>(&self, name: &str, build: F) -> Result<Arc<dyn Pulse>, AttenuatorError>
    where
        F: FnOnce() -> Result<Arc<dyn Pulse>, AttenuatorError>,
    {
        let mut pulses = self.pulses.write().unwrap_or_else(|e| e.into_inner());
        let key = name.to_lowercase();
        if pulses.contains_key(&key) {
            return Err(AttenuatorError::PulseAlreadyExists(name.to_string()));
        }
        let pulse = build()?;
        pulses.insert(key, Arc::clone(&pulse));
        log::info!(
            "Registered pulse '{}' ({:.3}Hz, {} inflight)",
            name,
            pulse.max_hertz(),
            pulse.max_inflight()
        );
        Ok(pulse)
    }

    /// Looks a pulse up by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Pulse>> {
        let pulses = self.pulses.read().unwrap_or_else(|e| e.into_inner());
        pulses.get(&name.to_lowercase()).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let pulses = self.pulses.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = pulses.values().map(|p| p.name().to_string()).collect();
        names.sort();
        names
    }

    /// Stops every emitter.
    pub fn shutdown_all(&self) {
        let pulses = self.pulses.read().unwrap_or_else(|e| e.into_inner());
        for pulse in pulses.values() {
            pulse.shutdown();
        }
    }
}

impl Default for PulseRegistry {
    fn default() -> Self {
        Self::new(noop_sink())
    }
}
